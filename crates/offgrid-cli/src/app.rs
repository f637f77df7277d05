//! Interactive chat session over the BLE link
//!
//! Reads prompt lines from stdin and turns them into frames, decodes the
//! inbound notification stream back into messages, saves received
//! attachments and keeps the session's chat log.

use std::path::PathBuf;
use std::time::Duration;

use offgrid_ble::{Central, ConnectionManager, LinkState, LinkStatus};
use offgrid_core::{FrameDecoder, FrameKind, HardwareAddress, OutboundFrame};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::attachments::{frame_from_file, AttachmentStore};
use crate::chat_log::ChatLog;
use crate::commands::connect;
use crate::config::ChatConfig;
use crate::error::Result;
use crate::input::{ChatInput, HELP};

/// What the session loop should do after handling an input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Reconnect,
    Quit,
}

/// One chat with the board
pub struct ChatSession<C: Central> {
    manager: ConnectionManager<C>,
    decoder: FrameDecoder,
    log: ChatLog,
    attachments: AttachmentStore,
}

impl<C: Central> ChatSession<C> {
    pub fn new(manager: ConnectionManager<C>, config: &ChatConfig) -> Self {
        let decoder = manager.codec().decoder();
        Self {
            manager,
            decoder,
            log: ChatLog::new(config.history_limit),
            attachments: AttachmentStore::new(config.attachments_dir()),
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Connect, then chat until the user quits, stdin closes or Ctrl+C
    pub async fn run(mut self, address: Option<HardwareAddress>, wait: Duration) -> Result<()> {
        let mut inbound = self.manager.subscribe_inbound();
        let mut status = self.manager.subscribe_status();

        connect(&self.manager, address, wait).await?;
        println!("Connected. Type /help for commands.");
        info!(attachments = %self.attachments.dir().display(), "Chat session started");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match self.handle_line(&line).await {
                        Flow::Continue => {}
                        Flow::Quit => break,
                        Flow::Reconnect => {
                            if let Err(e) = connect(&self.manager, address, wait).await {
                                println!("Reconnect failed: {}", e);
                            } else {
                                println!("Reconnected.");
                            }
                        }
                    }
                }

                chunk = inbound.recv() => {
                    match chunk {
                        Some(chunk) => self.handle_inbound(&chunk),
                        None => break,
                    }
                }

                event = status.recv() => {
                    match event {
                        Ok(event) => self.handle_status(event),
                        Err(RecvError::Lagged(skipped)) => debug!(skipped, "Status events skipped"),
                        Err(RecvError::Closed) => break,
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.manager.disconnect().await;
        if inbound.dropped() > 0 {
            warn!(dropped = inbound.dropped(), "Inbound buffers were lost to overflow");
        }
        info!(messages = self.log.len(), "Chat session ended");
        Ok(())
    }

    /// Act on one line typed at the prompt
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let input = match ChatInput::parse(line) {
            Ok(input) => input,
            Err(e) => {
                println!("{}", e);
                return Flow::Continue;
            }
        };

        match input {
            ChatInput::Empty => {}
            ChatInput::Help => println!("{}", HELP),
            ChatInput::Quit => return Flow::Quit,
            ChatInput::Reconnect => return Flow::Reconnect,
            ChatInput::Status => match self.manager.connected_peer().await {
                Some(peer) => println!("{} ({})", self.manager.state(), peer),
                None => println!("{}", self.manager.state()),
            },
            ChatInput::History(count) => {
                if self.log.is_empty() {
                    println!("No messages yet");
                }
                for entry in self.log.recent(count) {
                    println!("{}", entry);
                }
            }
            ChatInput::Save(path) => match self.log.save(&path) {
                Ok(()) => println!("Saved {} messages to {}", self.log.len(), path.display()),
                Err(e) => println!("Could not save chat log: {}", e),
            },
            ChatInput::Message(text) => self.send_text(text).await,
            ChatInput::Photo(path) => self.send_file(FrameKind::Photo, path).await,
            ChatInput::Audio(path) => self.send_file(FrameKind::Audio, path).await,
        }
        Flow::Continue
    }

    async fn send_text(&mut self, text: String) {
        match self.manager.write(OutboundFrame::text(text.as_str())).await {
            Ok(()) => {
                self.log.record_text(&text, true);
            }
            Err(e) => println!("Not sent: {}", e),
        }
    }

    async fn send_file(&mut self, kind: FrameKind, path: PathBuf) {
        let frame = match frame_from_file(kind, &path) {
            Ok(frame) => frame,
            Err(e) => {
                println!("Cannot read {}: {}", path.display(), e);
                return;
            }
        };

        let size = frame.len();
        match self.manager.write(frame).await {
            Ok(()) => {
                let entry = self.log.record_attachment(kind, true, Some(path), size);
                println!("{}", entry);
            }
            Err(e) => println!("Not sent: {}", e),
        }
    }

    /// Feed one notification buffer to the decoder and show what completed
    pub fn handle_inbound(&mut self, chunk: &[u8]) {
        for decoded in self.decoder.push(chunk) {
            let message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    warn!("Discarded inbound data: {}", e);
                    continue;
                }
            };

            let entry = match message.kind() {
                FrameKind::Text => match message.text() {
                    Ok(text) => self.log.record_text(text, false),
                    Err(e) => {
                        warn!("Dropped text message: {}", e);
                        continue;
                    }
                },
                kind => {
                    let file = match self.attachments.save(&message) {
                        Ok(path) => Some(path),
                        Err(e) => {
                            warn!("Could not save {}: {}", kind, e);
                            None
                        }
                    };
                    self.log
                        .record_attachment(kind, false, file, message.payload().len())
                }
            };
            println!("{}", entry);
        }
    }

    fn handle_status(&mut self, event: LinkStatus) {
        match event {
            LinkStatus::State(LinkState::Disconnected) => {
                // A frame cut off by the disconnect can never complete
                self.decoder.reset();
                println!("Link disconnected. Type /reconnect to try again.");
            }
            LinkStatus::State(state) => debug!(%state, "Link state"),
            LinkStatus::Matched(peer) => debug!(peer = %peer, "Peer matched"),
            LinkStatus::Failed(e) => println!("Link error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use offgrid_ble::{
        BleTransportConfig, BleTransportError, DiscoveryStream, GattCharacteristic, GattService,
        Link, NotificationStream, WriteMode,
    };
    use offgrid_core::{FrameCodec, PeripheralIdentity};

    /// A central whose adapter is switched off
    struct OffCentral;

    struct NoLink;

    #[async_trait]
    impl Central for OffCentral {
        type Link = NoLink;

        async fn check_ready(&self) -> offgrid_ble::Result<()> {
            Err(BleTransportError::AdapterDisabled)
        }
        async fn start_scan(&self) -> offgrid_ble::Result<DiscoveryStream> {
            Err(BleTransportError::AdapterDisabled)
        }
        async fn stop_scan(&self) -> offgrid_ble::Result<()> {
            Ok(())
        }
        async fn known_peripherals(&self) -> offgrid_ble::Result<Vec<PeripheralIdentity>> {
            Ok(Vec::new())
        }
        async fn connect(&self, _address: HardwareAddress) -> offgrid_ble::Result<NoLink> {
            Err(BleTransportError::AdapterDisabled)
        }
    }

    #[async_trait]
    impl Link for NoLink {
        fn address(&self) -> HardwareAddress {
            HardwareAddress::new([0; 6])
        }
        async fn discover_services(&self) -> offgrid_ble::Result<Vec<GattService>> {
            Ok(Vec::new())
        }
        async fn subscribe(
            &self,
            _characteristic: &GattCharacteristic,
        ) -> offgrid_ble::Result<NotificationStream> {
            Err(BleTransportError::SubscriptionFailed("no link".into()))
        }
        async fn write(
            &self,
            _characteristic: &GattCharacteristic,
            _data: &[u8],
            _mode: WriteMode,
        ) -> offgrid_ble::Result<()> {
            Err(BleTransportError::NotConnected)
        }
        async fn closed(&self) {}
        async fn disconnect(&self) -> offgrid_ble::Result<()> {
            Ok(())
        }
    }

    fn session(name: &str) -> (ChatSession<OffCentral>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("offgrid-app-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = ChatConfig {
            attachments_dir: Some(dir.clone()),
            ..Default::default()
        };
        let manager = ConnectionManager::new(OffCentral, BleTransportConfig::default());
        (ChatSession::new(manager, &config), dir)
    }

    #[tokio::test]
    async fn test_inbound_text_and_attachments_are_logged() {
        let (mut session, dir) = session("inbound");
        let codec = FrameCodec::default();

        let mut wire = codec.encode(&OutboundFrame::text("hi there")).unwrap();
        wire.extend(codec.encode(&OutboundFrame::photo(vec![9; 30])).unwrap());
        for chunk in wire.chunks(7) {
            session.handle_inbound(chunk);
        }

        let entries: Vec<_> = session.log().entries().cloned().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text.as_deref(), Some("hi there"));
        assert!(!entries[0].is_mine);
        assert_eq!(entries[1].kind, FrameKind::Photo);
        assert_eq!(entries[1].size, 30);

        let saved = entries[1].file.clone().unwrap();
        assert_eq!(std::fs::read(saved).unwrap(), vec![9; 30]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_garbage_is_skipped() {
        let (mut session, _dir) = session("garbage");
        session.handle_inbound(b"VIDEO:3:abc");
        session.handle_inbound(b"TEXT:2:ok");
        assert_eq!(session.log().len(), 1);
    }

    #[tokio::test]
    async fn test_unsent_messages_are_not_logged() {
        let (mut session, _dir) = session("unsent");
        assert_eq!(session.handle_line("hello").await, Flow::Continue);
        assert!(session.log().is_empty());

        assert_eq!(session.handle_line("/photo /does/not/exist.jpg").await, Flow::Continue);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn test_control_lines() {
        let (mut session, _dir) = session("control");
        assert_eq!(session.handle_line("/reconnect").await, Flow::Reconnect);
        assert_eq!(session.handle_line("/quit").await, Flow::Quit);
        assert_eq!(session.handle_line("/nonsense").await, Flow::Continue);
        assert_eq!(session.manager().state(), LinkState::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_resets_partial_frame() {
        let (mut session, _dir) = session("reset");
        session.handle_inbound(b"TEXT:10:abc");
        session.handle_status(LinkStatus::State(LinkState::Disconnected));
        session.handle_inbound(b"TEXT:2:ok");

        let texts: Vec<_> = session.log().entries().filter_map(|e| e.text.clone()).collect();
        assert_eq!(texts, vec!["ok".to_string()]);
    }
}
