// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

use crate::error::{AdminError, AdminResult};
use crate::operation::AdminOperation;

/// Envelope version understood by this release. Bumped together with any
/// change to the serialized shape of [`AdminOperation`].
const ENVELOPE_VERSION: u8 = 1;

/// Frames admin operations for the log: a one-byte envelope version followed
/// by the bcs-serialized operation.
pub struct OperationCodec;

impl OperationCodec {
    pub fn encode(operation: &AdminOperation) -> AdminResult<Bytes> {
        let payload = bcs::to_bytes(operation)
            .map_err(|e| AdminError::MalformedRecord(format!("serialization failed: {e}")))?;
        let mut buf = Vec::with_capacity(1 + payload.len());
        buf.push(ENVELOPE_VERSION);
        buf.extend_from_slice(&payload);
        Ok(buf.into())
    }

    pub fn decode(bytes: &[u8]) -> AdminResult<AdminOperation> {
        let Some((&version, payload)) = bytes.split_first() else {
            return Err(AdminError::MalformedRecord("empty record".to_string()));
        };
        if version != ENVELOPE_VERSION {
            return Err(AdminError::MalformedRecord(format!(
                "unknown envelope version {version}"
            )));
        }
        bcs::from_bytes(payload)
            .map_err(|e| AdminError::MalformedRecord(format!("undecodable payload: {e}")))
    }
}
