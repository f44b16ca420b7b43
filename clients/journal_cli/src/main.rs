use anyhow::Context;
use chrono::{Local, NaiveDate, Offset};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

mod entry;

use entry::Range;

const TIMELINE_BLOCK: &str = "Timeline";

#[derive(Parser, Debug)]
#[command(name = "journal", version)]
struct Args {
    /// BFF base URL, e.g. http://127.0.0.1:3000
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    bff_url: String,

    /// Roam graph name.
    #[arg(long, env = "ROAM_GRAPH_NAME")]
    graph: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append a timeline entry to today's page.
    Add {
        #[arg(long)]
        content: String,

        /// Start time (HH:MM). Defaults to the end of the last entry today or yesterday.
        #[arg(long)]
        start: Option<String>,

        /// End time (HH:MM). Defaults to now.
        #[arg(long)]
        end: Option<String>,
    },
    /// Append a plain note under today's Timeline block.
    Note {
        #[arg(long)]
        content: String,
    },
    /// Print a day's timeline entries.
    Entries {
        /// YYYY-MM-DD; defaults to today, or yesterday when today is empty.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the category tree.
    Categories,
    /// Print time spent per category.
    Stats {
        #[arg(long, value_enum, default_value = "day")]
        range: Range,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryView {
    #[serde(default)]
    order: Option<i64>,
    start_time: String,
    end_time: String,
    duration_minutes: u64,
    content: String,
}

#[derive(Debug, Deserialize)]
struct TimelineView {
    page: String,
    entries: Vec<EntryView>,
}

#[derive(Debug, Deserialize)]
struct CategoryView {
    name: String,
    #[serde(default)]
    children: Vec<CategoryView>,
}

#[derive(Debug, Deserialize)]
struct CategoriesView {
    categories: Vec<CategoryView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsView {
    name: String,
    total_duration_minutes: u64,
    percentage: u32,
    #[serde(default)]
    children: Vec<StatsView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    stats: Vec<StatsView>,
    total_duration_minutes: u64,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

struct Bff {
    http: Client,
    base: String,
    graph: String,
}

impl Bff {
    fn new(base: &str, graph: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            graph: graph.to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> anyhow::Result<T> {
        let url = format!("{}{path}", self.base);
        let res = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            let msg = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            anyhow::bail!("{url} -> {status}: {msg}");
        }
        serde_json::from_str(&text).with_context(|| format!("unexpected response from {url}"))
    }

    /// Roam action through the pass-through endpoint; `fields` are merged next to `action`.
    async fn action(&self, action: &str, fields: Value) -> anyhow::Result<Value> {
        let mut body = json!({ "action": action });
        if let (Some(obj), Value::Object(fields)) = (body.as_object_mut(), fields) {
            obj.extend(fields);
        }
        self.post(&format!("/api/roam/{}", self.graph), &body).await
    }

    async fn timeline(&self, date: NaiveDate) -> anyhow::Result<TimelineView> {
        self.post(
            "/api/roam/timeline",
            &json!({
                "graphName": self.graph,
                "date": date.format("%Y-%m-%d").to_string(),
            }),
        )
        .await
    }

    async fn find_timeline_uid(&self, page: &str) -> anyhow::Result<Option<String>> {
        let res = self
            .action(
                "q",
                json!({
                    "query": "[:find (pull ?b [:block/uid]) :in $ ?title ?container :where [?p :node/title ?title] [?b :block/page ?p] [?b :block/string ?container]]",
                    "args": [page, TIMELINE_BLOCK],
                }),
            )
            .await?;
        Ok(res
            .pointer("/result/0/0/:block~1uid")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn create_block(&self, location: Value, string: &str, uid: &str) -> anyhow::Result<()> {
        self.action("create-block", block_fields(location, string, uid))
            .await?;
        Ok(())
    }
}

/// `create-block` fields; the `action` key is added by `Bff::action`.
fn block_fields(location: Value, string: &str, uid: &str) -> Value {
    json!({
        "location": location,
        "block": { "string": string, "uid": uid },
    })
}

fn append_to(parent: &str) -> Value {
    json!({ "parent-uid": parent, "order": "last" })
}

fn fresh_uid(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn yesterday() -> NaiveDate {
    today().pred_opt().unwrap_or_else(today)
}

/// End time of the highest-ordered entry on today's page, else yesterday's,
/// together with the day whose page it came from.
async fn last_end_time(bff: &Bff) -> anyhow::Result<Option<(NaiveDate, String)>> {
    for day in [today(), yesterday()] {
        let view = bff.timeline(day).await?;
        if let Some(last) = view.entries.iter().max_by_key(|e| e.order.unwrap_or(0)) {
            debug!("last entry on {}: {}", view.page, last.end_time);
            return Ok(Some((day, last.end_time.clone())));
        }
    }
    Ok(None)
}

async fn add_entry(
    bff: &Bff,
    content: &str,
    start: Option<String>,
    end: Option<String>,
) -> anyhow::Result<()> {
    if content.trim().is_empty() {
        anyhow::bail!("--content must not be empty");
    }
    let end = match end {
        Some(end) => entry::parse_hhmm(&end)?,
        None => Local::now().time(),
    };
    let (anchor, start) = match start {
        Some(start) => (today(), start),
        None => last_end_time(bff).await?.context(
            "no previous entry today or yesterday; pass --start HH:MM",
        )?,
    };
    let start = entry::parse_hhmm(&start)?;
    debug!(
        "entry {} - {}, {} minutes",
        start.format("%H:%M"),
        end.format("%H:%M"),
        entry::minutes_between(start, end)
    );

    for (date, piece) in entry::dated_pieces(anchor, start, end)? {
        let page = entry::page_title(date);
        let parent = ensure_timeline(bff, date).await?;
        let text = piece.block_string(content);
        bff.create_block(append_to(&parent), &text, &fresh_uid("entry"))
            .await?;
        println!("{page}: {text}");
    }
    Ok(())
}

/// Uid of the date's Timeline block, creating the block at the end of the page if missing.
async fn ensure_timeline(bff: &Bff, date: NaiveDate) -> anyhow::Result<String> {
    let page = entry::page_title(date);
    if let Some(uid) = bff.find_timeline_uid(&page).await? {
        return Ok(uid);
    }
    let uid = entry::timeline_uid(date);
    info!("creating {TIMELINE_BLOCK} block on {page}");
    bff.create_block(
        json!({ "page-title": page, "order": "last" }),
        TIMELINE_BLOCK,
        &uid,
    )
    .await?;
    Ok(uid)
}

async fn add_note(bff: &Bff, content: &str) -> anyhow::Result<()> {
    let content = content.trim();
    if content.is_empty() {
        anyhow::bail!("--content must not be empty");
    }
    let date = today();
    let parent = ensure_timeline(bff, date).await?;
    bff.create_block(append_to(&parent), content, &fresh_uid("child"))
        .await?;
    println!("{}: {content}", entry::page_title(date));
    Ok(())
}

async fn print_entries(bff: &Bff, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let mut view = bff.timeline(date.unwrap_or_else(today)).await?;
    if date.is_none() && view.entries.is_empty() {
        view = bff.timeline(yesterday()).await?;
    }
    println!("{}", view.page);
    for e in &view.entries {
        println!(
            "  {} - {} ({}) {}",
            e.start_time,
            e.end_time,
            entry::duration_label(u32::try_from(e.duration_minutes).unwrap_or(u32::MAX)),
            e.content
        );
    }
    if view.entries.is_empty() {
        println!("  (no entries)");
    }
    Ok(())
}

fn print_categories(nodes: &[CategoryView], depth: usize) {
    for node in nodes {
        println!("{}{}", "  ".repeat(depth), node.name);
        print_categories(&node.children, depth + 1);
    }
}

fn stats_lines(nodes: &[StatsView], depth: usize, out: &mut Vec<String>) {
    for node in nodes {
        out.push(format!(
            "{}{}  {}  {}%",
            "  ".repeat(depth),
            node.name,
            entry::format_compact(node.total_duration_minutes),
            node.percentage
        ));
        stats_lines(&node.children, depth + 1, out);
    }
}

async fn print_stats(bff: &Bff, range: Range) -> anyhow::Result<()> {
    let (start, end) = entry::date_range(range, today());
    let tz_offset_minutes = Local::now().offset().fix().local_minus_utc() / 60;
    let res: StatsResponse = bff
        .post(
            "/api/roam/timeline-stats",
            &json!({
                "graphName": bff.graph,
                "startDate": start.format("%Y-%m-%d").to_string(),
                "endDate": end.format("%Y-%m-%d").to_string(),
                "tzOffsetMinutes": tz_offset_minutes,
            }),
        )
        .await?;

    println!(
        "{} - {}: {}",
        res.start_date,
        res.end_date,
        entry::format_compact(res.total_duration_minutes)
    );
    let mut lines = Vec::new();
    stats_lines(&res.stats, 1, &mut lines);
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "journal_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let bff = Bff::new(&args.bff_url, &args.graph)?;

    match args.command {
        Command::Add {
            content,
            start,
            end,
        } => add_entry(&bff, &content, start, end).await,
        Command::Note { content } => add_note(&bff, &content).await,
        Command::Entries { date } => print_entries(&bff, date).await,
        Command::Categories => {
            let view: CategoriesView = bff
                .post("/api/roam/categories", &json!({ "graphName": bff.graph }))
                .await?;
            print_categories(&view.categories, 0);
            Ok(())
        }
        Command::Stats { range } => print_stats(&bff, range).await,
    }
}
