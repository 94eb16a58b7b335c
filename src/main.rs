use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use shrine_atlas::config::Config;
use shrine_atlas::festival::{self, FestivalRule, RelativeRule};
use shrine_atlas::geo::BoundingBox;
use shrine_atlas::geohash;
use shrine_atlas::logging;
use shrine_atlas::ngram::ngram;
use shrine_atlas::search::{self, ShrineNameSearch};
use shrine_atlas::server::{self, AppState};
use shrine_atlas::session::BrowsingSession;
use shrine_atlas::viewport::CategoryFilter;
use std::error::Error;
use std::path::PathBuf;

type CliResult = Result<(), Box<dyn Error>>;

/// Shrine Atlas: shrine directory map engine
///
/// Geohash viewport loading, bigram text search and festival date rules,
/// as a local HTTP service or one-shot commands. JSON goes to stdout,
/// logs to stderr.
///
/// Examples:
///   atlas encode 35.6812 139.7671 --precision 7
///   atlas decode xn76urx
///   atlas festival --month 9 --week 3 --weekday 日
///   atlas --dataset shrines.json viewport --cell xn76 --zoom 14 --month 6
///   atlas --store-url https://records.example.org search 京都
///   atlas --dataset shrines.json serve --port 8787
#[derive(Parser)]
#[command(name = "atlas", version, about, long_about = None)]
struct Cli {
    /// Config file. Defaults to ~/.shrine-atlas/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Record store base URL.
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Serve records from this JSON dataset instead of the remote store.
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Never contact the remote store.
    #[arg(long, global = true)]
    offline: bool,

    /// Debug logging.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Encode a coordinate as a geohash.
    Encode {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, short = 'p', default_value_t = geohash::DEFAULT_PRECISION)]
        precision: usize,
    },

    /// Decode a geohash to its cell and centre.
    Decode { geohash: String },

    /// Split text into n-grams.
    Ngram {
        text: String,
        #[arg(short, default_value_t = 2)]
        n: usize,
    },

    /// Resolve a festival rule to dates.
    Festival(FestivalArgs),

    /// Load one viewport and list the visible shrines.
    Viewport(ViewportArgs),

    /// Suggest places matching text.
    Search { text: String },

    /// Search shrines by name.
    Shrines {
        name: String,
        /// Pages to fetch.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Show one shrine.
    Shrine { slug: String },
}

#[derive(Args)]
struct FestivalArgs {
    /// Fixed date, MM-DD.
    #[arg(long, conflicts_with = "month")]
    month_day: Option<String>,
    #[arg(long)]
    month: Option<u32>,
    /// Nth week of the month.
    #[arg(long)]
    week: Option<u32>,
    /// Weekday in kanji (日月火水木金土).
    #[arg(long)]
    weekday: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    start: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    end: Option<i64>,
    /// Reference date (YYYY-MM-DD). Defaults to today.
    #[arg(long, short = 'd')]
    date: Option<String>,
}

#[derive(Args)]
struct ViewportArgs {
    /// Use this geohash cell as the viewport.
    #[arg(long, conflicts_with_all = ["north", "south", "east", "west"])]
    cell: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    north: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    south: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    east: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    west: Option<f64>,
    /// Map zoom. Defaults to the configured zoom.
    #[arg(long)]
    zoom: Option<u8>,
    /// Only shrines with a festival in this month.
    #[arg(long, conflicts_with_all = ["deity", "this_week"])]
    month: Option<u32>,
    /// Only shrines enshrining this deity.
    #[arg(long, conflicts_with = "this_week")]
    deity: Option<String>,
    /// Only shrines with a festival this week.
    #[arg(long)]
    this_week: bool,
    /// Reference date (YYYY-MM-DD). Defaults to today.
    #[arg(long, short = 'd')]
    date: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Serve { host, port } => {
            let config = Config {
                host: host.unwrap_or(config.host),
                port: port.unwrap_or(config.port),
                ..config
            };
            let store = config.open_store()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::start(AppState::new(config, store)))?;
        }
        Command::Encode { lat, lon, precision } => {
            print_json(&serde_json::json!({ "geohash": geohash::encode(lat, lon, precision)? }))?;
        }
        Command::Decode { geohash: key } => {
            let bounds = geohash::decode_bounds(&key)?;
            print_json(&serde_json::json!({ "geohash": key, "center": bounds.center(), "bounds": bounds }))?;
        }
        Command::Ngram { text, n } => print_json(&ngram(&text, n))?,
        Command::Festival(args) => festival_dates(&config, args)?,
        Command::Viewport(args) => viewport(&config, args)?,
        Command::Search { text } => {
            let store = config.open_store()?;
            let result =
                search::suggest_cities(store.as_ref(), &config.city_collection, &text, config.search_page_size)?;
            print_json(&result)?;
        }
        Command::Shrines { name, pages } => {
            let store = config.open_store()?;
            let mut search = ShrineNameSearch::new(&name, &config.shrine_collection, config.search_page_size);
            for _ in 0..pages.max(1) {
                if search.fetch_more(store.as_ref())? == 0 {
                    break;
                }
            }
            print_json(&serde_json::json!({
                "items": search.items(),
                "endCursor": search.cursor(),
                "hasNextPage": search.has_next_page(),
            }))?;
        }
        Command::Shrine { slug } => {
            let store = config.open_store()?;
            match search::find_shrine(store.as_ref(), &config.shrine_collection, &slug)? {
                Some(shrine) => print_json(&shrine)?,
                None => return Err(format!("No shrine '{}'", slug).into()),
            }
        }
    }
    Ok(())
}

/// Config file, then command-line overrides.
fn load_config(cli: &Cli) -> Result<Config, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = &cli.store_url {
        config.store_url = Some(url.clone());
    }
    if let Some(path) = &cli.dataset {
        config.dataset = Some(path.clone());
    }
    if cli.offline {
        config.offline = true;
    }
    Ok(config)
}

fn reference_date(config: &Config, date: Option<&str>) -> Result<NaiveDate, Box<dyn Error>> {
    match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|e| format!("Invalid date '{}': {}", d, e).into()),
        None => Ok(config.today()?),
    }
}

fn festival_dates(config: &Config, args: FestivalArgs) -> CliResult {
    let rule = match (args.month_day, args.month) {
        (Some(month_day), _) => FestivalRule::absolute(month_day),
        (None, Some(month)) => {
            let rule = RelativeRule::from_parts(
                Some(month),
                args.week,
                args.weekday.as_deref().map(festival::weekday_from_kanji),
                args.start,
                args.end,
            );
            rule.validate()?;
            FestivalRule::Relative(rule)
        }
        (None, None) => return Err("Provide --month-day or --month".into()),
    };
    let reference = reference_date(config, args.date.as_deref())?;
    print_json(&serde_json::json!({
        "rule": rule,
        "reference": reference,
        "dates": rule.resolve(reference),
        "this_week": rule.occurs_in_week_of(reference),
    }))
}

fn viewport(config: &Config, args: ViewportArgs) -> CliResult {
    let bbox = match (&args.cell, args.north, args.south, args.east, args.west) {
        (Some(cell), ..) => geohash::decode_bounds(cell)?.to_bbox(),
        (None, Some(north), Some(south), Some(east), Some(west)) => BoundingBox::new(south, west, north, east),
        _ => return Err("Provide --cell or all of --north --south --east --west".into()),
    };
    let filter = match (args.month, args.deity) {
        (Some(month), _) if !(1..=12).contains(&month) => return Err("Month must be 1-12".into()),
        (Some(month), _) => CategoryFilter::Month(month),
        (None, Some(deity)) => CategoryFilter::Deity(deity),
        (None, None) if args.this_week => CategoryFilter::ThisWeek,
        (None, None) => CategoryFilter::None,
    };
    let today = reference_date(config, args.date.as_deref())?;

    let store = config.open_store()?;
    let mut session = BrowsingSession::new(config.session_options());
    let update = session.update_viewport(store.as_ref(), bbox, args.zoom.unwrap_or(config.default_zoom))?;
    let visible = session.visible_records(&filter, today);

    print_json(&serde_json::json!({
        "update": update,
        "filter": filter,
        "count": visible.len(),
        "records": visible,
        "facets": session.facets(today),
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
