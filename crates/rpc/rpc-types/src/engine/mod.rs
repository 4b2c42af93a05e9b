//! Types for the `engine_` namespace, as exchanged with the consensus layer.

mod blobs;
mod forkchoice;
mod payload;
mod transition;

pub use blobs::BlobsBundleV1;
pub use forkchoice::{ForkchoiceState, ForkchoiceUpdated, PayloadAttributes};
pub use payload::{
    ExecutionPayload, ExecutionPayloadEnvelopeV2, ExecutionPayloadEnvelopeV3, ExecutionPayloadV1,
    ExecutionPayloadV2, ExecutionPayloadV3, PayloadError, PayloadId, PayloadStatus,
    PayloadStatusEnum,
};
pub use transition::TransitionConfiguration;
