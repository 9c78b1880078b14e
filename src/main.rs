use clap::Parser;
use simultons::core::launcher::{LaunchSpec, Launcher};
use simultons::core::pubsub::Subscriber;
use simultons::domain::model::{SimulationRequest, SimulationState};
use simultons::domain::ports::{ConfigProvider, Satellite};
use simultons::utils::error::{ErrorSeverity, Result, SimError};
use simultons::utils::logger;
use simultons::{api, CliConfig, Command, SimConfig};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            // 日誌尚未初始化, 直接輸出
            eprintln!("❌ Configuration validation failed: {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 子程序的輸出由 launcher 收集, 用 JSON 方便解析
    let json = config.logging.json || matches!(cli.command, Command::Simulton { .. });
    if json {
        logger::init_json_logger(config.logging.verbose);
    } else {
        logger::init_cli_logger(config.logging.verbose);
    }
    if config.logging.verbose {
        tracing::debug!("CLI config: {:?}", cli);
        tracing::debug!("Resolved config: {:?}", config);
    }

    let result = match &cli.command {
        Command::Simulation { .. } => run_simulation(&config).await,
        Command::Simulton { kind, host, port } => api::simulton::run(*kind, host, *port).await,
        Command::Launch { .. } => launch_simulation(&config).await,
        Command::Subscribe { .. } => subscribe(&config).await,
    };

    if let Err(e) = result {
        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run_simulation(config: &SimConfig) -> Result<()> {
    let program = std::env::current_exe()?;
    tracing::info!("Starting simulation on {}", config.base_url());
    api::simulation::run(config, program, config.logging.verbose).await
}

/// Starts a simulation in its own process, waits until it answers and then
/// asks it to shut down.
async fn launch_simulation(config: &SimConfig) -> Result<()> {
    let mut args = vec![
        "simulation".to_string(),
        "--host".to_string(),
        config.host().to_string(),
        "--port".to_string(),
        config.port().to_string(),
        "--base-port".to_string(),
        config.base_port().to_string(),
        "--socket".to_string(),
        config.socket_path().display().to_string(),
    ];
    if config.logging.verbose {
        args.push("--verbose".to_string());
    }
    let mut launcher = Launcher::new(LaunchSpec {
        program: std::env::current_exe()?,
        args,
        host: config.host().to_string(),
        port: config.port(),
    });

    let pid = launcher.launch()?;
    tracing::info!("Simulation process {} launched", pid);

    let uri = "/api/v1/simulation";
    let Some(body) = launcher
        .wait_until_reachable(uri, config.health_timeout())
        .await?
    else {
        let report = launcher.shutdown(config.shutdown_timeout()).await?;
        eprintln!("{}", report.stderr);
        return Err(SimError::Unreachable {
            url: format!("{}{}", launcher.base_url(), uri),
            timeout_secs: config.health_timeout().as_secs(),
        });
    };
    println!("✅ Simulation reachable: {}", body);

    let client = launcher.rest_client(config.logging.verbose, false);
    let req = SimulationRequest {
        state: SimulationState::Shutting,
        rate: None,
    };
    match client.put(uri, &req).await {
        Ok((status, body)) => tracing::info!("Shutdown request: {} {}", status, body),
        Err(e) => tracing::warn!("Shutdown request failed: {}", e),
    }
    launcher.wait_to_die(config.shutdown_timeout()).await?;

    let report = launcher.shutdown(config.shutdown_timeout()).await?;
    println!(
        "🛑 Simulation {} exited with {:?} (signals: {:?})",
        report.pid, report.exit_code, report.signals_sent
    );
    Ok(())
}

struct Printer;

impl Satellite for Printer {
    fn on_paused(&mut self) {
        println!("⏸  PAUSED");
    }

    fn on_running(&mut self, rate: f64) {
        println!("▶  RUNNING at rate {}", rate);
    }

    fn on_shutting(&mut self) {
        println!("⏹  SHUTTING");
    }
}

async fn subscribe(config: &SimConfig) -> Result<()> {
    let path = config.socket_path();
    let mut subscriber = Subscriber::connect(path).await?;
    tracing::info!("📡 Listening for simulation broadcasts on {}", path.display());

    let mut printer = Printer;
    subscriber.run(&mut printer).await?;
    tracing::info!("Broadcast stream ended");
    Ok(())
}
