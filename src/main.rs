//! IOTMesh hub command line.
//!
//! Usage:
//!   iotmesh-hub run
//!   iotmesh-hub simulate --interval-secs 2
//!   iotmesh-hub switch light on
//!   iotmesh-hub login --name Asha --phone 9876543210 --otp 4567

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use iotmesh_hub::alerts::{AlertEvaluator, DatabaseAlertSink, history};
use iotmesh_hub::clock::now_millis;
use iotmesh_hub::config::{Config, load_dotenv};
use iotmesh_hub::controls::{Actuator, ControlMirror};
use iotmesh_hub::dashboard::DashboardView;
use iotmesh_hub::error::{HubError, Result};
use iotmesh_hub::instance_lock::InstanceLock;
use iotmesh_hub::monitor::SensorMonitor;
use iotmesh_hub::sensors::{HistoryRange, history as sensor_history};
use iotmesh_hub::notify::{AlertNotifier, FcmGateway, PushGateway, server};
use iotmesh_hub::session::{self, LoginFlow, Session, SessionStore, login};
use iotmesh_hub::simulation::run_sensor_simulation;
use iotmesh_hub::source::{DataSource, FirebaseSource, MemorySource};
use iotmesh_hub::status::StatusReporter;
use iotmesh_hub::telegram::TelegramSubscribers;
use iotmesh_hub::users::UserDirectory;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "iotmesh-hub")]
#[command(about = "Home sensor hub: alert logging, actuator control and push forwarding")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor sensors, log alerts and mirror controls until Ctrl+C
    Run,
    /// Run the hub on an in-process database fed by a simulated sensor node
    Simulate {
        /// Seconds between simulated readings
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
    /// Serve the push-token endpoint and broadcast threshold crossings
    NotifyServer,
    /// Switch an actuator on or off
    Switch {
        /// light, fan, relay1..relay4 or lock
        #[arg(value_parser = Actuator::parse)]
        actuator: Actuator,
        state: SwitchState,
    },
    /// Show actuator state
    Controls,
    /// Show sensor history, oldest first
    History {
        /// Range in hours: 1, 12 or 24
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    /// List recent alerts, newest first
    Alerts {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List recorded logins, or delete one (admin only)
    Users {
        /// Key of the entry to delete
        #[arg(long)]
        delete: Option<String>,
    },
    /// Sign in with the demo OTP; pass --admin-password for admin access
    Login {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        otp: String,
        #[arg(long)]
        admin_password: Option<String>,
    },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Register a Telegram alert subscriber
    Telegram { name: String, chat_id: String },
}

impl Commands {
    /// Commands a signed-in user runs by hand; they keep the session alive.
    fn is_user_activity(&self) -> bool {
        matches!(
            self,
            Commands::Switch { .. }
                | Commands::Controls
                | Commands::History { .. }
                | Commands::Alerts { .. }
                | Commands::Users { .. }
                | Commands::Whoami
                | Commands::Telegram { .. }
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SwitchState {
    On,
    Off,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Environment is written here, before any runtime threads exist.
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(execute(cli.command, config)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn connect(config: &Config) -> Result<Arc<dyn DataSource>> {
    Ok(Arc::new(FirebaseSource::new(&config.database)?))
}

fn open_session(config: &Config) -> Session {
    Session::open(
        SessionStore::new(config.session.storage_file.clone()),
        config.session.idle_timeout(),
    )
}

fn format_millis(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn execute(command: Commands, config: Config) -> Result<()> {
    if command.is_user_activity()
        && let Err(e) = open_session(&config).record_activity()
    {
        warn!("Could not record session activity: {}", e);
    }

    match command {
        Commands::Run => {
            let _lock = InstanceLock::acquire()?;
            run_hub(connect(&config)?, &config).await
        }
        Commands::Simulate { interval_secs } => {
            let source: Arc<dyn DataSource> = Arc::new(MemorySource::new());
            let simulation = run_sensor_simulation(
                source.clone(),
                config.paths.sensor.clone(),
                Duration::from_secs(interval_secs.max(1)),
            );
            let result = run_hub(source, &config).await;
            simulation.abort();
            result
        }
        Commands::NotifyServer => notify_server(&config).await,
        Commands::Switch { actuator, state } => {
            let mirror = ControlMirror::new(connect(&config)?, config.paths.controls.clone());
            mirror.write(actuator, state == SwitchState::On).await?;
            println!(
                "{} switched {}",
                actuator,
                if state == SwitchState::On { "ON" } else { "OFF" }
            );
            Ok(())
        }
        Commands::Controls => {
            let mirror = ControlMirror::new(connect(&config)?, config.paths.controls.clone());
            let state = mirror.read().await?;
            for (actuator, on) in state.iter() {
                println!("{:<8}{}", actuator.to_string(), if on { "ON" } else { "OFF" });
            }
            if let Some(ts) = state.timestamp {
                println!("Last change {}", format_millis(ts));
            }
            Ok(())
        }
        Commands::History { hours } => {
            let range = HistoryRange::from_hours(hours)?;
            let source = connect(&config)?;
            let points =
                sensor_history::fetch(source.as_ref(), &config.paths.history, range, now_millis())
                    .await?;
            if points.is_empty() {
                println!("No history in the last {}h", range.hours());
            }
            for p in points {
                println!(
                    "{}  {:>5.1}°C {:>5.1}% {:>5.0} PPM {:>7.1} hPa {:>5.1} cm",
                    format_millis(p.timestamp),
                    p.temperature,
                    p.humidity,
                    p.gas,
                    p.pressure,
                    p.water_level
                );
            }
            Ok(())
        }
        Commands::Alerts { limit } => {
            let source = connect(&config)?;
            let alerts = history::fetch(source.as_ref(), &config.paths.alerts, limit).await?;
            if alerts.is_empty() {
                println!("No alerts");
            }
            for alert in alerts {
                println!(
                    "{}  {:<8} {:<12} {}",
                    format_millis(alert.timestamp),
                    alert.severity,
                    alert.alert_type,
                    alert.message
                );
            }
            Ok(())
        }
        Commands::Users { delete } => {
            let directory = UserDirectory::new(connect(&config)?, config.paths.users.clone());
            match delete {
                Some(id) => {
                    directory.delete(&open_session(&config), &id).await?;
                    println!("User deleted");
                }
                None => {
                    for user in directory.list().await? {
                        println!(
                            "{:<22} {:<16} {:<12} {:<6} {}",
                            user.id,
                            user.name,
                            user.phone,
                            user.role,
                            format_millis(user.timestamp)
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Login {
            name,
            phone,
            otp,
            admin_password,
        } => {
            let mut flow = LoginFlow::new(&config.session);
            flow.submit_details(&name, &phone)?;
            flow.verify_otp(&otp)?;
            let record = match admin_password {
                Some(password) => flow.login_admin(&password)?,
                None => flow.login_guest()?,
            };
            let role = record.role;
            let directory = UserDirectory::new(connect(&config)?, config.paths.users.clone());
            login::complete(record, &open_session(&config), &directory).await?;
            println!("Signed in as {} ({})", name.trim(), role);
            Ok(())
        }
        Commands::Logout => {
            open_session(&config).sign_out()?;
            println!("Signed out");
            Ok(())
        }
        Commands::Whoami => {
            match open_session(&config).user() {
                Some(user) => println!("{} ({})", user.name, user.role),
                None => println!("Not signed in (guest)"),
            }
            Ok(())
        }
        Commands::Telegram { name, chat_id } => {
            let subscribers =
                TelegramSubscribers::new(connect(&config)?, config.paths.telegram_subscribers.clone());
            subscribers.register(&name, &chat_id).await?;
            println!("Subscriber saved!");
            Ok(())
        }
    }
}

async fn run_hub(source: Arc<dyn DataSource>, config: &Config) -> Result<()> {
    info!("Starting IOTMesh hub");
    info!(
        "  Alert policy: {} (cooldown {}s)",
        config.alerts.policy, config.alerts.cooldown_secs
    );
    info!("  Sensor path: {}", config.paths.sensor);

    let sink = Arc::new(DatabaseAlertSink::new(
        source.clone(),
        config.paths.alerts.clone(),
    ));
    let monitor = SensorMonitor::new(
        source.clone(),
        config.paths.sensor.clone(),
        AlertEvaluator::new(config.alerts.policy, config.alerts.cooldown()),
        sink,
    );
    let sensor_handle = monitor.start().await?;

    let mirror = ControlMirror::new(source.clone(), config.paths.controls.clone());
    let controls_handle = mirror
        .subscribe(|state| {
            let on: Vec<String> = state
                .iter()
                .filter(|(_, on)| *on)
                .map(|(actuator, _)| actuator.to_string())
                .collect();
            if on.is_empty() {
                info!("[Controls] All off");
            } else {
                info!("[Controls] On: {}", on.join(", "));
            }
        })
        .await?;

    let status = StatusReporter::new(source.clone(), config.paths.status.clone());
    if let Err(e) = status.report(true).await {
        warn!("Could not report online status: {}", e);
    }

    let shutdown = CancellationToken::new();
    let session = Arc::new(open_session(config));
    let idle_task = tokio::spawn(session::run_idle_logout(session, shutdown.clone()));

    let mut latest = monitor.watch();
    let dashboard_task = tokio::spawn(async move {
        while latest.changed().await.is_ok() {
            let snapshot = latest.borrow_and_update().clone();
            let view = DashboardView::new(snapshot.as_ref(), Local::now().naive_local());
            info!("[Sensor] {}", view);
        }
    });

    info!("IOTMesh hub is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    shutdown.cancel();
    sensor_handle.unsubscribe();
    controls_handle.unsubscribe();
    dashboard_task.abort();
    let _ = idle_task.await;

    if let Err(e) = status.report(false).await {
        warn!("Could not report offline status: {}", e);
    }
    info!("IOTMesh hub stopped");
    Ok(())
}

async fn notify_server(config: &Config) -> Result<()> {
    let server_key = config
        .push
        .server_key
        .clone()
        .ok_or_else(|| HubError::InvalidConfig("FCM_SERVER_KEY is not set".to_string()))?;
    let gateway: Arc<dyn PushGateway> = Arc::new(FcmGateway::new(server_key)?);

    let source = connect(config)?;
    let notifier = Arc::new(AlertNotifier::new(gateway.clone(), config.push.topic.clone()));
    let _notifier_handle = notifier.start(source.as_ref(), &config.paths.sensor).await?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        trigger.cancel();
    });

    server::serve(&config.push.bind_addr, gateway, &config.push.topic, shutdown).await
}
