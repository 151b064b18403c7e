//! kiosk - attendance station: live recognition loop and session commands

use anyhow::{anyhow, Result};
use attendance_kiosk::camera::open_camera;
use attendance_kiosk::overlay::RasterSurface;
use attendance_kiosk::reports::{load_report, render_table};
use attendance_kiosk::runtime::ThreadDispatcher;
use attendance_kiosk::session::{SessionForm, SessionManager, SessionState};
use attendance_kiosk::ui::{ConsoleView, Ui};
use attendance_kiosk::{
    AttendanceApi, ExportFormat, HttpApi, Kiosk, KioskConfig, ReportFilter, SessionId, ViewModel,
};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live kiosk loop. Reads `start <class> <subject> [minutes]`,
    /// `end`, `reopen`, `status` and `quit` from stdin.
    Run {
        /// Start a session for this class right away (needs --subject).
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        minutes: Option<u32>,
        /// Write the last overlay to this PNG on exit.
        #[arg(long, value_name = "PNG")]
        snapshot: Option<PathBuf>,
        /// Snap boxes to their targets instead of gliding.
        #[arg(long)]
        no_smoothing: bool,
    },
    /// Show the server's current session.
    Status,
    /// Start a session.
    Start {
        class_name: String,
        subject_id: String,
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// End the running session and mark absentees.
    End,
    /// Reopen an ended session for late marking.
    Reopen { session_id: String },
    /// Print attendance records.
    Report {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Download attendance records as CSV or Excel.
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        /// csv or excel
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
struct FilterArgs {
    /// YYYY-MM-DD
    #[arg(long)]
    start_date: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    end_date: Option<String>,
    #[arg(long)]
    class: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> ReportFilter {
        ReportFilter::new(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            self.class.as_deref(),
        )
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let cfg = KioskConfig::load()?;

    match args.command {
        Command::Run {
            class,
            subject,
            minutes,
            snapshot,
            no_smoothing,
        } => {
            let form = match (class, subject) {
                (Some(class), Some(subject)) => Some(SessionForm::new(&class, &subject, minutes)),
                (None, None) => None,
                _ => return Err(anyhow!("--class and --subject must be given together")),
            };
            run(cfg, &ui, form, snapshot, no_smoothing)
        }
        Command::Status => {
            let api = connect(&cfg, &ui)?;
            let status = {
                let _stage = ui.stage("Check session");
                api.session_status()?
            };
            match status.session_id.filter(|_| status.active) {
                Some(id) => println!(
                    "session {} {} ({} / {}), {:.1} min left",
                    id,
                    status.status.as_deref().unwrap_or("Active"),
                    status.class_name.as_deref().unwrap_or("-"),
                    status.subject_id.as_deref().unwrap_or("-"),
                    status.remaining_minutes
                ),
                None => println!("no active session"),
            }
            Ok(())
        }
        Command::Start {
            class_name,
            subject_id,
            minutes,
        } => {
            let api = connect(&cfg, &ui)?;
            let mut manager = SessionManager::new(cfg.default_duration_minutes);
            let mut view = ViewModel::new();
            let form = SessionForm::new(&class_name, &subject_id, minutes);
            let result = {
                let _stage = ui.stage("Start session");
                manager.start_with(&api, &form, &mut view)
            };
            finish_one_shot(result, &manager, SessionState::Active, &mut view)
        }
        Command::End => {
            let api = connect(&cfg, &ui)?;
            let mut manager = SessionManager::new(cfg.default_duration_minutes);
            let mut view = ViewModel::new();
            let result = {
                let _stage = ui.stage("End session");
                manager
                    .status_with(&api, &mut view)
                    .and_then(|_| manager.end_with(&api, &mut view))
            };
            finish_one_shot(result, &manager, SessionState::Ended, &mut view)
        }
        Command::Reopen { session_id } => {
            let api = connect(&cfg, &ui)?;
            let mut manager = SessionManager::new(cfg.default_duration_minutes);
            let mut view = ViewModel::new();
            manager.assume_ended(SessionId::new(session_id.trim()));
            let result = {
                let _stage = ui.stage("Reopen session");
                manager.reopen_with(&api, &mut view)
            };
            finish_one_shot(result, &manager, SessionState::Reopened, &mut view)
        }
        Command::Report { filter } => {
            let api = connect(&cfg, &ui)?;
            let records = {
                let _stage = ui.stage("Load attendance");
                load_report(&api, &filter.to_filter())?
            };
            print!("{}", render_table(&records));
            if records.is_empty() {
                println!();
            }
            Ok(())
        }
        Command::Export {
            filter,
            format,
            output,
        } => {
            let format: ExportFormat = format.parse()?;
            let filter = filter.to_filter();
            filter.validate()?;
            let api = connect(&cfg, &ui)?;
            let output = output
                .unwrap_or_else(|| PathBuf::from(format!("attendance_export.{}", format.extension())));
            let bytes = {
                let _stage = ui.stage("Download export");
                api.download_export(&filter, format, &output)?
            };
            println!("export written to {} ({} bytes)", output.display(), bytes);
            Ok(())
        }
    }
}

fn connect(cfg: &KioskConfig, ui: &Ui) -> Result<HttpApi> {
    let mut api = HttpApi::new(cfg)?;
    let _stage = ui.stage("Fetch anti-forgery token");
    api.ensure_csrf_token()?;
    Ok(api)
}

fn finish_one_shot(
    result: Result<Vec<attendance_kiosk::session::Effect>, attendance_kiosk::ValidationError>,
    manager: &SessionManager,
    expected: SessionState,
    view: &mut ViewModel,
) -> Result<()> {
    let mut console = ConsoleView::new();
    console.render(view, &mut std::io::stdout())?;
    result?;
    if manager.state() != expected {
        return Err(anyhow!("server did not confirm the request"));
    }
    if let Some(id) = manager.session_id().or(manager.ended_session_id()) {
        println!("session {}", id);
    }
    Ok(())
}

fn run(
    mut cfg: KioskConfig,
    ui: &Ui,
    form: Option<SessionForm>,
    snapshot: Option<PathBuf>,
    no_smoothing: bool,
) -> Result<()> {
    if no_smoothing {
        cfg.overlay.smoothing = false;
    }
    let interval = cfg.frame_interval();
    let api = connect(&cfg, ui)?;
    let camera = open_camera(&cfg.camera)?;
    let dispatch = ThreadDispatcher::spawn(Arc::new(api))?;
    let mut kiosk = Kiosk::new(cfg, camera, Box::new(dispatch))?;
    log::info!(
        "kiosk running at {} fps with camera {}",
        kiosk.config().overlay.display_fps,
        kiosk.stream().camera().describe()
    );

    if let Err(err) = kiosk.check_session_status() {
        log::warn!("status check skipped: {}", err);
    }
    let mut queued_start = form;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }
    let commands = spawn_command_reader()?;
    let mut console = ConsoleView::new();
    let mut stdout = std::io::stdout();

    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();

        // The status check must settle before a start from the command line.
        if kiosk.session().pending().is_none() {
            if let Some(form) = queued_start.take() {
                if let Err(err) = kiosk.start_session(&form) {
                    eprintln!("{}", err);
                }
            }
        }
        let mut quit = false;
        for line in commands.try_iter() {
            quit |= !handle_command(&mut kiosk, &line);
        }
        if quit {
            break;
        }

        kiosk.frame(now);
        console.render(kiosk.view_mut(), &mut stdout)?;
        stdout.flush()?;
        if kiosk.view().auth_required() {
            break;
        }

        let spent = now.elapsed();
        if spent < interval {
            std::thread::sleep(interval - spent);
        }
    }

    if let Some(path) = snapshot {
        let (width, height) = match kiosk.surface().size() {
            (0, _) | (_, 0) => (kiosk.config().camera.width, kiosk.config().camera.height),
            size => size,
        };
        let mut raster = RasterSurface::new(width, height);
        let painted = kiosk.paint_snapshot(&mut raster);
        raster.save_png(&path)?;
        println!("overlay snapshot ({} boxes) written to {}", painted, path.display());
    }
    kiosk.shutdown();
    Ok(())
}

/// Returns `false` when the operator asked to quit.
fn handle_command(kiosk: &mut Kiosk, line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    let result = match words.as_slice() {
        [] => Ok(()),
        ["quit"] | ["exit"] => return false,
        ["start", class, subject] => kiosk.start_session(&SessionForm::new(class, subject, None)),
        ["start", class, subject, minutes] => match minutes.parse::<u32>() {
            Ok(minutes) => kiosk.start_session(&SessionForm::new(class, subject, Some(minutes))),
            Err(_) => {
                eprintln!("minutes must be a whole number");
                Ok(())
            }
        },
        ["end"] => kiosk.end_session(),
        ["reopen"] => kiosk.reopen_session(),
        ["status"] => kiosk.check_session_status(),
        _ => {
            eprintln!("commands: start <class> <subject> [minutes] | end | reopen | status | quit");
            Ok(())
        }
    };
    if let Err(err) = result {
        eprintln!("{}", err);
    }
    true
}

fn spawn_command_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("kiosk-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}
