//! Connection reader.
//!
//! One loop per session reads frames in order: responses resolve the
//! correlation table, pushes are decoded and handed to the registry.

use gatebot_core::{Push, Transport};
use gatebot_transport::InboundFrame;
use tokio_util::sync::CancellationToken;

use crate::{Bot, DispatchError};

/// Read frames until the transport closes or `cancel` fires.
///
/// # Errors
/// Returns [`DispatchError::ConnectionClosed`] if the transport closed or
/// failed. Cancellation is a clean exit.
pub(crate) async fn read_loop(
    bot: &Bot,
    transport: &dyn Transport,
    cancel: &CancellationToken,
) -> Result<(), DispatchError> {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Reader cancelled");
                return Ok(());
            }
            frame = transport.recv() => frame,
        };

        match frame {
            Some(Ok(raw)) => handle_frame(bot, &raw),
            Some(Err(e)) => {
                tracing::error!("Failed to read frame: {e}");
                return Err(DispatchError::ConnectionClosed);
            }
            None => {
                tracing::info!("Connection closed by gateway");
                return Err(DispatchError::ConnectionClosed);
            }
        }
    }
}

fn handle_frame(bot: &Bot, raw: &[u8]) {
    let frame = match InboundFrame::decode(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Failed to parse frame: {e}: {}", String::from_utf8_lossy(raw));
            return;
        }
    };

    if frame.is_push(bot.config().reserved_sync_id) {
        match Push::decode(frame.data) {
            Ok(push) => {
                tracing::debug!("Receive {}", push.payload().kind());
                bot.registry().dispatch(bot, push);
            }
            Err(e) => tracing::warn!("Failed to decode push: {e}"),
        }
    } else if !bot.correlation().resolve(frame.sync_id, frame.data) {
        tracing::debug!("No pending request for syncId={}", frame.sync_id);
    }
}
