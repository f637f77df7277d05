//! Single-writer outbound queue
//!
//! Every frame goes through one task, so the chunks of two frames never
//! interleave on the link. A write completes once each chunk has been
//! handed to the link layer; the peer does not acknowledge frames.

use offgrid_core::{chunk_payload, FrameCodec, OutboundFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::central::Link;
use crate::connection::LinkSlot;
use crate::error::{BleTransportError, Result};

/// Frames waiting for the writer before `write` callers are held back
const WRITE_QUEUE_DEPTH: usize = 32;

struct WriteJob {
    frame: OutboundFrame,
    reply: oneshot::Sender<Result<usize>>,
}

/// Handle to the writer task
#[derive(Debug, Clone)]
pub(crate) struct OutboundWriter {
    jobs: mpsc::Sender<WriteJob>,
}

impl std::fmt::Debug for WriteJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteJob")
            .field("kind", &self.frame.kind())
            .field("len", &self.frame.len())
            .finish()
    }
}

impl OutboundWriter {
    /// Start the writer task. It ends when the last handle is dropped.
    pub fn spawn<L: Link>(
        slot: LinkSlot<L>,
        codec: FrameCodec,
        chunk_size: usize,
        write_uuid: Uuid,
    ) -> Self {
        let (jobs, mut queue) = mpsc::channel::<WriteJob>(WRITE_QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                let result = write_frame(&slot, &codec, chunk_size, write_uuid, &job.frame).await;
                if let Err(e) = &result {
                    warn!(kind = %job.frame.kind(), "Write failed: {}", e);
                }
                // Caller may have given up waiting
                let _ = job.reply.send(result);
            }
            debug!("Writer task stopped");
        });

        Self { jobs }
    }

    /// Queue a frame and wait until it has been handed to the link layer.
    /// Returns the number of link-layer writes issued.
    pub async fn write(&self, frame: OutboundFrame) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(WriteJob { frame, reply })
            .await
            .map_err(|_| BleTransportError::NotConnected)?;
        response.await.map_err(|_| BleTransportError::NotConnected)?
    }
}

async fn write_frame<L: Link>(
    slot: &LinkSlot<L>,
    codec: &FrameCodec,
    chunk_size: usize,
    write_uuid: Uuid,
    frame: &OutboundFrame,
) -> Result<usize> {
    let target = {
        let guard = slot.lock().await;
        guard
            .as_ref()
            .ok_or(BleTransportError::NotConnected)?
            .write_target(write_uuid)?
    };

    let bytes = codec.encode_for_transfer(frame, chunk_size)?;

    let mut writes = 0;
    for chunk in chunk_payload(&bytes, chunk_size) {
        target
            .link
            .write(&target.characteristic, chunk, target.mode)
            .await
            .map_err(|e| match e {
                BleTransportError::WriteRejected(_) => e,
                other => BleTransportError::WriteRejected(other.to_string()),
            })?;
        writes += 1;
    }

    debug!(
        kind = %frame.kind(),
        bytes = bytes.len(),
        writes,
        "Frame written"
    );
    Ok(writes)
}
