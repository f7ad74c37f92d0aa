use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ehrview_core::{Connector, FirebaseOptions};
use ehrview_dashboard::{
    text, Command, Outcome, PageConfig, PageSession, PageView, RenderContext, SessionEvent, HELP,
};

/// Main entry point for the interactive dashboard
///
/// Mounts one page against the configured backend and re-renders it to stdout after
/// every snapshot, seed completion and command read from stdin. Logs go to stderr.
///
/// # Environment Variables
/// - `FIREBASE_API_KEY`, `FIREBASE_AUTH_DOMAIN`, `FIREBASE_PROJECT_ID`: required
/// - `FIREBASE_STORAGE_BUCKET`, `FIREBASE_SENDER_ID`, `FIREBASE_APP_ID`: optional
/// - `EHRVIEW_USE_EMULATORS`: use the local Firestore and Auth emulators
/// - `EHRVIEW_ALLOW_DEMO_SEED`: show the seed control
/// - `EHRVIEW_IN_MEMORY`: use an in-process store instead of Firestore
/// - `EHRVIEW_POLL_INTERVAL_MS`: Firestore refresh interval (default 2000)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ehrview_core=info".parse()?)
                .add_directive("ehrview_dashboard=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = match FirebaseOptions::from_env() {
        Ok(options) => options,
        Err(err) => {
            draw(&PageView::failed(&PageConfig::default(), "Configuration error", &err), None)?;
            return Err(err.into());
        }
    };
    let config = PageConfig::from_options(&options);

    let connection = match Connector::new().connect(&options) {
        Ok(connection) => connection,
        Err(err) => {
            draw(&PageView::failed(&config, "Configuration error", &err), None)?;
            return Err(err.into());
        }
    };

    let mut session = match PageSession::mount(connection, config.clone()).await {
        Ok(session) => session,
        Err(err) => {
            draw(&PageView::failed(&config, "Could not sign in", &err), None)?;
            return Err(err.into());
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut message: Option<String> = None;
    let mut events_open = true;
    draw(&session.page(&RenderContext::local_now()), None)?;

    loop {
        tokio::select! {
            event = session.next_event(), if events_open => match event {
                Some(SessionEvent::StreamFailed(reason)) => {
                    tracing::error!("live query stopped: {reason}");
                }
                Some(_) => {}
                None => events_open = false,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let ctx = RenderContext::local_now();
                let outcome = line
                    .parse::<Command>()
                    .and_then(|command| session.handle(command, &ctx));
                match outcome {
                    Ok(Outcome::Quit) => break,
                    Ok(Outcome::ShowHelp) => message = Some(HELP.to_string()),
                    Ok(Outcome::Updated) => message = None,
                    Err(err) => message = Some(err.to_string()),
                }
                // A started seed task is a new event source.
                events_open = true;
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        draw(&session.page(&RenderContext::local_now()), message.as_deref())?;
    }

    session.unmount();
    Ok(())
}

fn draw(page: &PageView, message: Option<&str>) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    // Clear the screen and move the cursor home.
    write!(stdout, "\x1b[2J\x1b[H")?;
    write!(stdout, "{}", text::render(page))?;
    if let Some(message) = message {
        writeln!(stdout)?;
        writeln!(stdout, "{message}")?;
    }
    write!(stdout, "\n> ")?;
    stdout.flush()
}
