// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use nino::config;
use nino::console::Console;
use nino::fixture::catalog::Catalog;
use nino::fixture::{ParameterType, ValueSpec};
use nino::shutdown::ShutdownHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=nino lighting console

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/nino
ExecStart=/usr/local/bin/nino start "$NINO_CONFIG"
ExecReload=/bin/kill -HUP $MAINPID

[Install]
WantedBy=multi-user.target
Alias=nino.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A live lighting console."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the fixture modes in a fixture library.
    Fixtures {
        /// The path to the fixture library.
        path: String,
    },
    /// Prints the parameters of a fixture mode with their DMX offsets.
    Profile {
        /// The path to the fixture library.
        path: String,
        /// The fixture manufacturer.
        manufacturer: String,
        /// The fixture model.
        model: String,
        /// The fixture mode. Leave empty for single mode fixtures.
        #[arg(default_value = "")]
        mode: String,
    },
    /// Start will start the console.
    Start {
        /// The path to the console config.
        config_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fixtures { path } => {
            let catalog = Catalog::load(&PathBuf::from(&path))?;
            let entries = catalog.entries();

            if entries.is_empty() {
                println!("No fixtures found in {}.", path);
                return Ok(());
            }

            println!("Fixtures (count: {}):", entries.len());
            for entry in entries {
                println!("- {}", entry);
            }
        }
        Commands::Profile {
            path,
            manufacturer,
            model,
            mode,
        } => {
            let mut catalog = Catalog::load(&PathBuf::from(&path))?;
            let profile = catalog.load_profile(&manufacturer, &model, &mode)?;

            println!("{} (footprint: {}):", profile, profile.footprint());
            for parameter in profile.parameters() {
                let offset = match parameter.kind {
                    ParameterType::Htp16 | ParameterType::Ltp16 => format!(
                        "{}/{}",
                        parameter.offset.high_byte + 1,
                        parameter.offset.low_byte + 1
                    ),
                    ParameterType::Htp8 | ParameterType::Ltp8 => {
                        format!("{}", parameter.offset.high_byte + 1)
                    }
                    ParameterType::Virtual | ParameterType::Unsupported(_) => "-".to_string(),
                };
                let values = match &parameter.values {
                    ValueSpec::Range { min, max, .. } => format!("{}-{}", min, max),
                    ValueSpec::Table(entries) => format!("table of {}", entries.len()),
                };
                println!(
                    "- {} [{}] slot {} ({}, default {}, group {})",
                    parameter.name, parameter.kind, offset, values, parameter.default, parameter.group
                );
            }
        }
        Commands::Start { config_path } => {
            let config = config::Console::deserialize(&PathBuf::from(&config_path))?;
            let tick = config.tick()?;
            let shutdown = ShutdownHandle::new();

            let console_shutdown = shutdown.clone();
            let console = tokio::task::spawn_blocking(move || {
                let mut console = Console::open(&config)?;
                console.run(tick, &console_shutdown);
                console.shutdown();
                Ok::<(), nino::console::ConsoleError>(())
            });

            let signal_shutdown = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Received interrupt, shutting down"),
                    Err(e) => error!(err = e.to_string(), "Unable to listen for interrupt"),
                }
                signal_shutdown.shutdown();
            });

            console.await??;
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
