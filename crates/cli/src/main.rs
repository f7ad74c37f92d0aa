use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ehrview_core::constants::DEFAULT_SEED_COUNT;
use ehrview_core::{
    resources_query, subscribe, Connection, Connector, FirebaseOptions, SortDirection, SortKey,
    SortSpec, ViewState,
};
use ehrview_dashboard::{text, DetailView, RenderContext, TableView};
use ehrview_types::DocumentId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ehrview")]
#[command(about = "Clinical resource dashboard CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resource table from the current data
    List {
        /// Only rows whose resource type or state contains this text
        #[arg(long)]
        filter: Option<String>,
        /// Sort column: created or fetched
        #[arg(long, default_value = "fetched")]
        sort: SortKey,
        /// Oldest first
        #[arg(long)]
        asc: bool,
    },
    /// Print the detail panel for one document
    Show {
        /// Document id
        id: DocumentId,
    },
    /// Write demo documents (requires EHRVIEW_ALLOW_DEMO_SEED)
    Seed {
        /// Number of documents to write
        #[arg(long, default_value_t = DEFAULT_SEED_COUNT)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ehrview_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = FirebaseOptions::from_env().context("reading backend configuration")?;
    let connection = Connector::new()
        .connect(&options)
        .context("connecting to backend")?;

    match cli.command {
        Commands::List { filter, sort, asc } => {
            let direction = if asc {
                SortDirection::Asc
            } else {
                SortDirection::Desc
            };
            let mut view = first_snapshot(&connection).await?;
            view.set_filter(filter.unwrap_or_default());
            view.set_sort(SortSpec::new(sort, direction));

            let table = TableView::from_view(&view, &RenderContext::local_now());
            print!("{}", text::render_table(&table));
        }
        Commands::Show { id } => {
            let mut view = first_snapshot(&connection).await?;
            view.select_record(&id)?;
            let ctx = RenderContext::local_now();
            if let Some(detail) = view.detail() {
                print!("{}", text::render_detail(&DetailView::build(detail, &ctx)));
            }
        }
        Commands::Seed { count } => {
            if !options.allow_demo_seed {
                bail!("demo seeding is disabled; set EHRVIEW_ALLOW_DEMO_SEED=true to enable it");
            }
            match ehrview_core::seed(&connection, count).await {
                Ok(report) => println!(
                    "Seeded {} of {} documents.",
                    report.written, report.requested
                ),
                Err(err) => {
                    println!("Seeded {} of {count} documents before failing.", err.written());
                    return Err(err.into());
                }
            }
        }
    }

    Ok(())
}

/// Open the live query, take its first snapshot and detach.
async fn first_snapshot(connection: &Connection) -> anyhow::Result<ViewState> {
    let session = connection
        .ensure_session()
        .await
        .context("establishing anonymous session")?;
    let mut subscription = subscribe(connection, &session, &resources_query());

    let mut view = ViewState::new();
    match subscription.next().await {
        Some(Ok(records)) => view.on_snapshot(records),
        Some(Err(err)) => return Err(err).context("reading resources"),
        None => bail!("live query ended before delivering data"),
    }
    subscription.cancel();
    Ok(view)
}
