//! exception-notifier - email notifications for unhandled errors.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use exception_notifier::cli::{Cli, Command, LogFormat, run_command};
use exception_notifier::config::{AppPaths, Config};
use exception_notifier::template::TemplateEngine;
use exception_notifier::{ExceptionRecord, NotificationDispatcher};

/// Initialize the tracing subscriber with the specified log format.
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let paths = AppPaths::new(&cli.root);
    let environment = cli.environment.as_deref();

    match cli.command {
        Command::Validate => {
            validate(&paths, environment);
            Ok(())
        }
        Command::Render { message } => {
            let dispatcher = load_dispatcher(&paths, environment);
            let text = dispatcher.render(&sample_record(&message), None)?;
            println!("{}", text);
            Ok(())
        }
        Command::Test { message } => {
            let dispatcher = load_dispatcher(&paths, environment);
            dispatcher.notify_record(sample_record(&message), None)?;
            println!(
                "Test notification sent via {} to {}",
                dispatcher.config().server,
                dispatcher.config().header.to.addresses().join(", ")
            );
            Ok(())
        }
        Command::Run { command } => {
            let dispatcher = load_dispatcher(&paths, environment);
            match dispatcher.guarded_call(|| run_command(&command)) {
                Ok(()) => Ok(()),
                Err(failure) => {
                    error!(error = %failure, "Guarded command failed");
                    std::process::exit(failure.exit_code());
                }
            }
        }
    }
}

fn sample_record(message: &str) -> ExceptionRecord {
    ExceptionRecord::new("TestNotification", message)
}

/// Load configuration and template, exiting with code 1 on any configuration error.
fn load_dispatcher(paths: &AppPaths, environment: Option<&str>) -> NotificationDispatcher {
    info!(root = %paths.root().display(), "Loading configuration");

    match NotificationDispatcher::from_app_root(paths.root(), environment) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!(error = %e, "Failed to load exception notifier configuration");
            std::process::exit(1);
        }
    }
}

/// Validate mode: report every problem, print a summary on success.
fn validate(paths: &AppPaths, environment: Option<&str>) {
    let config_path = paths.config_file();

    let config = match Config::load_from_root(paths, environment) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut failed = false;
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        failed = true;
    }

    if let Err(e) = TemplateEngine::load(&paths.template(&config.template)) {
        error!(error = %e, "Template validation error");
        failed = true;
    }

    if failed {
        error!("Configuration validation failed");
        std::process::exit(1);
    }

    println!("Configuration is valid: {}", config_path.display());
    println!("  Server: {}:{} (tls: {:?})", config.server, config.port, config.tls);
    println!("  From: {}", config.header.from);
    println!("  To: {}", config.header.to.addresses().join(", "));
    println!("  Template: {}", paths.template(&config.template).display());
    if let Some(name) = &config.application_name {
        println!("  Application: {}", name);
    }
}
