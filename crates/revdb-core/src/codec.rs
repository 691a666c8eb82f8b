//! Document body encoding
//!
//! Bodies are MessagePack encodings of the root dictionary. Blobs are written
//! as metadata dictionaries and their content travels with the save as
//! attachments.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::MutexGuard;

use crate::blob::Blob;
use crate::collection::Dictionary;
use crate::engine::StorageEngine;
use crate::error::{Error, Result};
use crate::value::Value;

/// Output of one encoding pass
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub body: Bytes,
    pub attachments: Vec<Blob>,
}

/// Encode a root dictionary without registering attachments
pub fn encode_body(root: &Dictionary) -> Result<Bytes> {
    let mut encoder = SharedEncoder::new();
    encoder.encode(root)?;
    Ok(encoder.finish().body)
}

/// Decode a body without resolving blob content
pub fn decode_body(body: &[u8]) -> Result<Dictionary> {
    decode(body, None)
}

/// Reusable encoder, one per database
#[derive(Debug, Default)]
pub(crate) struct SharedEncoder {
    buffer: Vec<u8>,
    attachments: Vec<Blob>,
}

impl SharedEncoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn encode(&mut self, root: &Dictionary) -> Result<()> {
        if let Some(unsupported) = root.values().find_map(Value::find_unsupported) {
            return Err(Error::InvalidArgument(format!(
                "unsupported value for storage: {:?}",
                unsupported
            )));
        }
        for value in root.values() {
            collect_attachments(value, &mut self.attachments);
        }
        rmp_serde::encode::write(&mut self.buffer, root).map_err(|e| Error::Codec(e.to_string()))
    }

    pub(crate) fn finish(&mut self) -> EncodedBody {
        let body = Bytes::copy_from_slice(&self.buffer);
        self.buffer.clear();
        EncodedBody {
            body,
            attachments: std::mem::take(&mut self.attachments),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.attachments.clear();
    }
}

/// Exclusive use of a database's shared encoder for one save
///
/// The encoder is reset when the session ends, whether or not encoding
/// succeeded.
pub(crate) struct EncoderSession<'a> {
    encoder: MutexGuard<'a, SharedEncoder>,
}

impl<'a> EncoderSession<'a> {
    pub(crate) fn new(encoder: MutexGuard<'a, SharedEncoder>) -> Self {
        Self { encoder }
    }

    pub(crate) fn encode(mut self, root: &Dictionary) -> Result<EncodedBody> {
        self.encoder.encode(root)?;
        Ok(self.encoder.finish())
    }
}

impl Drop for EncoderSession<'_> {
    fn drop(&mut self) {
        self.encoder.reset();
    }
}

fn collect_attachments(value: &Value, attachments: &mut Vec<Blob>) {
    match value {
        Value::Blob(blob) => {
            if blob.content().is_some() && !attachments.iter().any(|b| b == blob) {
                attachments.push(blob.clone());
            }
        }
        Value::Array(arr) => arr.iter().for_each(|v| collect_attachments(v, attachments)),
        Value::Dictionary(dict) => dict
            .values()
            .for_each(|v| collect_attachments(v, attachments)),
        _ => {}
    }
}

/// Shared decoding state of a database, guarded by the database lock
#[derive(Debug)]
pub(crate) struct DecodeContext {
    engine: Arc<dyn StorageEngine>,
    blobs: HashMap<String, Bytes>,
}

impl DecodeContext {
    pub(crate) fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            blobs: HashMap::new(),
        }
    }

    fn blob_content(&mut self, digest: &str) -> Option<Bytes> {
        if let Some(content) = self.blobs.get(digest) {
            return Some(content.clone());
        }
        let content = self.engine.blob(digest)?;
        self.blobs.insert(digest.to_string(), content.clone());
        Some(content)
    }
}

pub(crate) fn decode(body: &[u8], context: Option<&mut DecodeContext>) -> Result<Dictionary> {
    let mut root: Dictionary =
        rmp_serde::from_slice(body).map_err(|e| Error::Codec(e.to_string()))?;
    if let Some(context) = context {
        for value in root.make_mut().values_mut() {
            resolve_blobs(value, context);
        }
    }
    Ok(root)
}

fn resolve_blobs(value: &mut Value, context: &mut DecodeContext) {
    match value {
        Value::Blob(blob) if blob.content().is_none() => {
            if let Some(content) = context.blob_content(blob.digest()) {
                blob.attach_content(content);
            }
        }
        Value::Array(arr) => arr
            .make_mut()
            .iter_mut()
            .for_each(|v| resolve_blobs(v, context)),
        Value::Dictionary(dict) => dict
            .make_mut()
            .values_mut()
            .for_each(|v| resolve_blobs(v, context)),
        _ => {}
    }
}
