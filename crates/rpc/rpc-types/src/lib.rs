//! Wire types for the Engine API: the JSON shapes exchanged with the consensus layer and their
//! conversions to and from canonical blocks.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

/// Engine API types.
pub mod engine;

pub use engine::{
    BlobsBundleV1, ExecutionPayload, ExecutionPayloadEnvelopeV2, ExecutionPayloadEnvelopeV3,
    ExecutionPayloadV1, ExecutionPayloadV2, ExecutionPayloadV3, ForkchoiceState,
    ForkchoiceUpdated, PayloadAttributes, PayloadError, PayloadId, PayloadStatus,
    PayloadStatusEnum, TransitionConfiguration,
};
