//! Archive decoding side of a restore.
//!
//! ZIP entry readers are synchronous, so decoding runs on a blocking thread and
//! hands work to the async side over bounded channels. A closed channel means the
//! restore was abandoned and the producer stops.

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Read, Seek};
use tokio::sync::mpsc;
use tracing::debug;

use super::plan::RestorePlan;
use crate::archive::ArchiveReader;
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::structure::CollectionStructure;

/// Events buffered between the decoder and the stores
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Object chunks buffered per object
const BODY_CHANNEL_CAPACITY: usize = 4;

const CHUNK_SIZE: usize = 64 * 1024;

pub(crate) enum RestoreEvent {
    Object {
        bucket: String,
        key: String,
        body: mpsc::Receiver<Result<Bytes>>,
    },
    Structure {
        collection: Collection,
        structure: CollectionStructure,
    },
    Documents {
        collection: Collection,
        documents: Vec<Value>,
    },
}

pub(crate) type EventSender = mpsc::Sender<Result<RestoreEvent>>;

/// Decodes every planned entry in restore order: objects first, then collections.
///
/// Structures were parsed while planning; only object bodies and data entries are read here.
pub(crate) fn produce<R: Read + Seek>(
    mut reader: ArchiveReader<R>,
    plan: RestorePlan,
    events: EventSender,
    batch_size: usize,
) {
    let outcome = stream_objects(&mut reader, &plan, &events)
        .and_then(|()| stream_collections(&mut reader, &plan, &events, batch_size.max(1)));

    if let Err(err) = outcome {
        let _ = events.blocking_send(Err(err));
    }
}

fn stream_objects<R: Read + Seek>(
    reader: &mut ArchiveReader<R>,
    plan: &RestorePlan,
    events: &EventSender,
) -> Result<()> {
    for object in &plan.objects {
        if events.is_closed() {
            return Ok(());
        }

        let mut entry = reader.open_entry(&object.entry)?;
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let event = RestoreEvent::Object {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            body: body_rx,
        };
        if events.blocking_send(Ok(event)).is_err() {
            return Ok(());
        }

        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            match entry.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buffer[..n]);
                    if body_tx.blocking_send(Ok(chunk)).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // The body consumer fails the upload, the event consumer fails the restore
                    let _ = body_tx.blocking_send(Err(Error::corrupt_data(&object.entry, &e)));
                    return Err(Error::corrupt_data(&object.entry, e));
                }
            }
        }
        debug!("Decoded {}", object.entry);
    }

    Ok(())
}

fn stream_collections<R: Read + Seek>(
    reader: &mut ArchiveReader<R>,
    plan: &RestorePlan,
    events: &EventSender,
    batch_size: usize,
) -> Result<()> {
    for restore in &plan.collections {
        if events.is_closed() {
            return Ok(());
        }

        let collection = restore.collection;
        let data_entry = &restore.entries.data;

        if events
            .blocking_send(Ok(RestoreEvent::Structure {
                collection,
                structure: restore.structure.clone(),
            }))
            .is_err()
        {
            return Ok(());
        }

        let lines = BufReader::new(MultiGzDecoder::new(reader.open_entry(data_entry)?)).lines();
        let mut batch = Vec::with_capacity(batch_size);
        for (index, line) in lines.enumerate() {
            let line = line.map_err(|e| Error::corrupt_data(data_entry, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let document: Value = serde_json::from_str(&line)
                .map_err(|e| Error::corrupt_data(data_entry, format!("line {}: {}", index + 1, e)))?;
            batch.push(document);

            if batch.len() >= batch_size {
                let documents = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if send_documents(events, collection, documents).is_err() {
                    return Ok(());
                }
            }
        }

        if !batch.is_empty() && send_documents(events, collection, batch).is_err() {
            return Ok(());
        }
        debug!("Decoded {}", data_entry);
    }

    Ok(())
}

fn send_documents(
    events: &EventSender,
    collection: Collection,
    documents: Vec<Value>,
) -> std::result::Result<(), ()> {
    events
        .blocking_send(Ok(RestoreEvent::Documents {
            collection,
            documents,
        }))
        .map_err(|_| ())
}
