mod app;
mod braille;
mod config;
mod controller;
mod data;
mod error;
mod map;
mod port;
mod progress;
mod timer;
mod ui;
mod unlock;
mod view;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use config::Settings;
use controller::{Controller, DeepLink};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind};
use crossterm::execute;
use data::Dataset;
use map::{MapRenderer, Viewport};
use progress::{FileStorage, ProgressStore};
use ratatui::DefaultTerminal;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use view::{TuiView, ViewTiming};

/// Terminal map of a place-by-place city quest
#[derive(Parser, Debug)]
#[command(name = "quest-map", version)]
struct Args {
    /// Config file (defaults to ./quest-map.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Places dataset
    #[arg(long)]
    data: Option<PathBuf>,

    /// Directory holding saved progress and the log file
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// City to show first
    #[arg(long)]
    city: Option<String>,

    /// Place to focus and open on startup
    #[arg(long)]
    focus: Option<String>,

    /// Link such as `quest-map://open?city=grodno&focus=g2`
    link: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(data) = &args.data {
        settings.data_path = data.clone();
    }
    if let Some(dir) = &args.storage_dir {
        settings.storage_dir = dir.clone();
    }

    init_logging(&settings)?;
    info!(data = %settings.data_path.display(), "starting quest-map");

    let link = deep_link(&args);

    let dataset = match Dataset::load(&settings.data_path) {
        Ok(dataset) => dataset,
        Err(e) => {
            tracing::error!(error = %e, "cannot load places");
            show_fatal(&format!("Cannot load places: {e}"), &settings)?;
            return Err(e).context("loading places");
        }
    };

    let store = ProgressStore::load(
        FileStorage::new(settings.storage_dir.clone()),
        settings.storage_key.clone(),
        &dataset,
    );

    // Load whatever basemap layers exist, fall back to a rough outline
    let mut map_renderer = MapRenderer::new();
    if settings.basemap_dir.exists() {
        data::load_basemap(&mut map_renderer, &settings.basemap_dir);
    }
    if !map_renderer.has_data() {
        warn!("no basemap data found, using the built-in coastline");
        data::generate_coarse_coastline(&mut map_renderer);
    }

    let timing = ViewTiming {
        notice: Duration::from_millis(settings.notice_ms),
        pan_delay: Duration::from_millis(settings.pan_delay_ms),
        pan_duration: Duration::from_millis(settings.pan_duration_ms),
    };
    let view = TuiView::new(Viewport::new(0.0, 0.0, 1.0, 0, 0), map_renderer, timing);
    let controller = Controller::new(
        dataset,
        store,
        &settings.default_city,
        settings.focus_zoom_floor,
    );

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = run(&mut terminal, controller, view, &link);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Log to a file; stdout belongs to the terminal UI
fn init_logging(settings: &Settings) -> Result<()> {
    let path = settings.log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = File::create(&path).with_context(|| format!("creating log {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// The positional link, with `--city`/`--focus` taking precedence
fn deep_link(args: &Args) -> DeepLink {
    let from_link = match args.link.as_deref().map(DeepLink::parse) {
        Some(Ok(link)) => link,
        Some(Err(e)) => {
            warn!(error = %e, "ignoring unreadable link");
            DeepLink::default()
        }
        None => DeepLink::default(),
    };
    from_link.overridden_by(DeepLink {
        city: args.city.clone(),
        focus: args.focus.clone(),
    })
}

/// Show a startup error until a key is pressed or the notice time runs out
fn show_fatal(message: &str, settings: &Settings) -> Result<()> {
    let mut terminal = ratatui::init();
    let deadline = Instant::now() + Duration::from_millis(settings.notice_ms);
    let result = wait_on_fatal(&mut terminal, message, deadline);
    ratatui::restore();
    result
}

fn wait_on_fatal(terminal: &mut DefaultTerminal, message: &str, deadline: Instant) -> Result<()> {
    while Instant::now() < deadline {
        terminal.draw(|frame| ui::render_fatal(frame, message))?;
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn run(
    terminal: &mut DefaultTerminal,
    controller: Controller<FileStorage>,
    view: TuiView,
    link: &DeepLink,
) -> Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(controller, view, size.width, size.height);
    app.start(link);

    // Main loop
    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;

        // Handle events with ~60fps target
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                // Only handle key press events (not release)
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key.code),
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                Event::Resize(width, height) => app.resize(width, height),
                _ => {}
            }
        }

        // Notices and pans advance on wall-clock time
        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
