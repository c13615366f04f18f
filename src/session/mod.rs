//! Async device session: one task per connected device.
//!
//! [`DeviceSession::spawn`] moves a [`DeviceAdapter`](crate::adapter::DeviceAdapter)
//! into a tokio task together with a [`NotificationSource`] and a
//! [`CommandSink`]. The task processes exactly one notification or one
//! queued command at a time, so cycles never overlap and commands read a
//! consistent device state.
//!
//! ```rust,no_run
//! use ef_ble_protocol::config::SessionConfig;
//! use ef_ble_protocol::devices::Delta2;
//! use ef_ble_protocol::session::{ChannelSink, ChannelSource, DeviceSession};
//! use futures::StreamExt;
//!
//! # async fn demo() -> ef_ble_protocol::Result<()> {
//! let (notifications, source) = ChannelSource::channel(32);
//! let (sink, _written) = ChannelSink::channel(8);
//! let session = DeviceSession::spawn(Delta2::new()?, source, sink, SessionConfig::default());
//!
//! let mut reports = Box::pin(session.subscribe());
//! while let Some(report) = reports.next().await {
//!     for change in &report.changes {
//!         println!("{} = {}", change.property, change.value);
//!     }
//! }
//! # drop(notifications);
//! # Ok(())
//! # }
//! ```

mod driver;
mod transport;

pub use driver::{DeviceSession, PropertySnapshot, SessionStats};
pub use transport::{ChannelSink, ChannelSource, CommandSink, NotificationSource};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;
    use crate::codec::PacketCodec;
    use crate::config::{DeviceProfile, ProfileCommand, ProfileDevice, SessionConfig};
    use crate::test_utils::FrameBuilder;
    use crate::types::Value;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;

    const PROFILE: &str = r#"
name: Test Pack
codec: { xor: true }
layouts:
  - name: pack
    fields:
      - { name: soc, type: u8 }
      - { name: watts, type: u16 }
mappings:
  - { property: battery_level, record: pack, field: soc }
  - { property: output_power, record: pack, field: watts }
routes:
  - { src: 0x03, cmd_set: 0x20, cmd_id: 0x02, record: pack }
commands:
  - { name: charge_limit, dst: 0x03, cmd_set: 0x20, cmd_id: 0x31, range: [50, 100] }
"#;

    fn device() -> ProfileDevice {
        DeviceProfile::from_yaml(PROFILE).unwrap().build().unwrap()
    }

    fn pack_frame(soc: u8, watts: u16, seq: u32) -> Vec<u8> {
        let mut payload = vec![soc];
        payload.extend_from_slice(&watts.to_le_bytes());
        FrameBuilder::new(0x03, 0x20, 0x02).seq(seq).payload(payload).build()
    }

    struct FailingSource;

    #[async_trait]
    impl NotificationSource for FailingSource {
        async fn next_notification(&mut self) -> crate::Result<Option<Vec<u8>>> {
            Err(ProtocolError::transport_failed("link lost"))
        }
    }

    #[tokio::test]
    async fn notifications_flow_to_subscribers_and_snapshot() {
        let _ = tracing_subscriber::fmt::try_init();
        let (tx, source) = ChannelSource::channel(8);
        let (sink, _writes) = ChannelSink::channel(8);
        let session = DeviceSession::spawn(device(), source, sink, SessionConfig::default());
        let mut reports = Box::pin(session.subscribe());

        tx.send(pack_frame(80, 350, 1)).await.unwrap();
        let report = tokio::time::timeout(Duration::from_secs(1), reports.next()).await.unwrap().unwrap();
        assert!(report.changed("battery_level"));
        assert!(report.changed("output_power"));

        // Corrupted frame is dropped, the next one still lands
        let mut corrupted = pack_frame(81, 350, 2);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        tx.send(corrupted).await.unwrap();
        tx.send(pack_frame(81, 350, 3)).await.unwrap();

        let report = tokio::time::timeout(Duration::from_secs(1), reports.next()).await.unwrap().unwrap();
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].value, Value::UInt8(81));
        assert_eq!(session.snapshot().get("output_power"), Some(&Value::UInt16(350)));

        drop(tx);
        session.closed().await;
        let stats = session.stats();
        assert_eq!(stats.notifications, 3);
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.dropped_frames, 1);
        assert!(reports.next().await.is_none());
    }

    #[tokio::test]
    async fn commands_are_encoded_and_written() {
        let (_tx, source) = ChannelSource::channel(8);
        let (sink, mut writes) = ChannelSink::channel(8);
        let session = DeviceSession::spawn(device(), source, sink, SessionConfig::default());

        let frames = session.send_command(ProfileCommand::new("charge_limit", 30)).await.unwrap();
        assert_eq!(frames, 1);

        let written = writes.recv().await.unwrap();
        let packet = PacketCodec::new(true).parse(&written).unwrap();
        assert_eq!((packet.dst, packet.cmd_set, packet.cmd_id), (0x03, 0x20, 0x31));
        assert_eq!(packet.payload, vec![50]);

        let rejected = session.send_command(ProfileCommand::new("unknown", 1)).await;
        assert!(matches!(rejected, Err(ProtocolError::CommandRejected { .. })));

        let stats = session.shutdown().await.unwrap();
        assert_eq!(stats.commands, 1);
        assert_eq!(stats.failed_commands, 1);
    }

    #[tokio::test]
    async fn transport_errors_exhaust_the_budget() {
        let config = SessionConfig { max_transport_errors: 3, backoff_base_ms: 1, ..SessionConfig::default() };
        let (sink, _writes) = ChannelSink::channel(1);
        let session = DeviceSession::spawn(device(), FailingSource, sink, config);

        tokio::time::timeout(Duration::from_secs(2), session.closed()).await.unwrap();
        assert_eq!(session.stats().notifications, 0);

        let result = session.send_command(ProfileCommand::new("charge_limit", 60)).await;
        assert!(matches!(result, Err(ProtocolError::SessionClosed)));
    }

    #[tokio::test]
    async fn shutdown_cancels_a_waiting_session() {
        let (_tx, source) = ChannelSource::channel(1);
        let (sink, _writes) = ChannelSink::channel(1);
        let session = DeviceSession::spawn(device(), source, sink, SessionConfig::default());
        let mut snapshots = Box::pin(session.snapshots());

        let initial = snapshots.next().await.unwrap();
        assert!(initial.is_empty());

        let stats = tokio::time::timeout(Duration::from_secs(1), session.shutdown()).await.unwrap().unwrap();
        assert_eq!(stats, SessionStats::default());
    }
}
