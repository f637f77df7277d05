//! Command handlers for the OffGridChat CLI

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use offgrid_ble::{
    BtleplugCentral, Central, ConnectionManager, LinkState, LinkStatus, MatchPeripheral,
};
use offgrid_core::{FrameKind, HardwareAddress, OutboundFrame};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::app::ChatSession;
use crate::attachments::frame_from_file;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Scan { timeout, all } => {
                Self::handle_scan_command(config, Duration::from_secs(timeout), all).await
            }
            Commands::Chat {
                address,
                output_dir,
            } => {
                let mut config = config;
                if output_dir.is_some() {
                    config.chat.attachments_dir = output_dir;
                }
                Self::handle_chat_command(config, parse_address(address)?).await
            }
            Commands::Send {
                address,
                photo,
                audio,
                message,
            } => {
                let frame = match (photo, audio, message) {
                    (Some(path), _, _) => frame_from_file(FrameKind::Photo, &path)?,
                    (_, Some(path), _) => frame_from_file(FrameKind::Audio, &path)?,
                    (_, _, Some(text)) => OutboundFrame::text(text),
                    (None, None, None) => {
                        return Err(CliError::InvalidInput("nothing to send".to_string()))
                    }
                };
                Self::handle_send_command(config, parse_address(address)?, frame).await
            }
        }
    }

    /// List peripherals seen during a scan
    async fn handle_scan_command(config: AppConfig, duration: Duration, all: bool) -> Result<()> {
        let central = BtleplugCentral::new(config.ble.direct_connect_timeout).await?;
        central.check_ready().await?;

        let matcher = config.ble.name_matcher();
        let mut discovered = central.start_scan().await?;
        let mut seen = HashSet::new();
        info!("Scanning for {} seconds...", duration.as_secs());

        let _ = timeout(duration, async {
            while let Some(peripheral) = discovered.next().await {
                let likely = matcher.matches(&peripheral);
                if (all || likely) && seen.insert(peripheral.address) {
                    let marker = if likely { "*" } else { " " };
                    println!("{} {}", marker, peripheral);
                }
            }
        })
        .await;

        if let Err(e) = central.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        if seen.is_empty() {
            println!("No peripherals found");
        }
        Ok(())
    }

    /// Connect and run an interactive chat session
    async fn handle_chat_command(config: AppConfig, address: Option<HardwareAddress>) -> Result<()> {
        let manager = ConnectionManager::with_btleplug(config.ble.clone()).await?;
        let session = ChatSession::new(manager, &config.chat);
        session.run(address, config.chat.connect_timeout()).await
    }

    /// Connect, write one frame and disconnect
    async fn handle_send_command(
        config: AppConfig,
        address: Option<HardwareAddress>,
        frame: OutboundFrame,
    ) -> Result<()> {
        let manager = ConnectionManager::with_btleplug(config.ble.clone()).await?;
        connect(&manager, address, config.chat.connect_timeout()).await?;

        let kind = frame.kind();
        let len = frame.len();
        let result = manager.write(frame).await;
        manager.disconnect().await;
        result?;

        println!("Sent {} ({} bytes)", kind, len);
        Ok(())
    }
}

fn parse_address(address: Option<String>) -> Result<Option<HardwareAddress>> {
    address
        .map(|a| HardwareAddress::parse(&a))
        .transpose()
        .map_err(CliError::from)
}

/// Start a connection attempt and wait until the link is usable.
///
/// Fails with the first reported error if the attempt ends disconnected,
/// or with the binding error if the link came up without I/O.
pub async fn connect<C: Central>(
    manager: &ConnectionManager<C>,
    address: Option<HardwareAddress>,
    wait: Duration,
) -> Result<()> {
    let mut status = manager.subscribe_status();

    match address {
        Some(address) => manager.connect_direct(address).await,
        None => manager.scan_and_connect_default().await,
    }

    let settled = timeout(
        wait,
        manager.wait_for_state(|s| {
            matches!(
                s,
                LinkState::Ready | LinkState::ReadyWithoutIo | LinkState::Disconnected
            )
        }),
    )
    .await;

    let settled = match settled {
        Ok(state) => state,
        Err(_) => {
            manager.disconnect().await;
            return Err(CliError::Timeout(format!(
                "link did not become ready within {}s",
                wait.as_secs()
            )));
        }
    };

    if settled == LinkState::Ready {
        if let Some(peer) = manager.connected_peer().await {
            info!(peer = %peer, "Connected");
        }
        return Ok(());
    }

    let mut failure = None;
    while let Ok(event) = status.try_recv() {
        if let LinkStatus::Failed(e) = event {
            failure.get_or_insert(e);
        }
    }
    manager.disconnect().await;
    Err(match failure {
        Some(e) => e.into(),
        None => CliError::Ble(offgrid_ble::BleTransportError::NotConnected),
    })
}
