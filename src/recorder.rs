//! Report recorder
//!
//! The recorder subscribes to everything its attached testpoints and brokers
//! publish and appends each report to a flat data file: a 4-byte big-endian
//! payload length followed by the serialized report record. A side index
//! (see [`crate::index`]) stores the identifying fields and the payload's
//! byte offset so readers can seek directly to a record.
//!
//! The data file is truncated on start; a recorder run is one capture.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::index::{IndexEntry, RecordIndex};
use crate::logging::LogHandle;
use crate::protocol::ProbeReport;
use crate::transport::{Endpoint, Message, Subscriber};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

enum RecorderCommand {
    Ready {
        respond_to: oneshot::Sender<()>,
    },
    Add {
        publish: Endpoint,
        respond_to: oneshot::Sender<()>,
    },
    End {
        respond_to: oneshot::Sender<()>,
    },
}

struct RecorderEngine {
    command_rx: mpsc::Receiver<RecorderCommand>,
    subscriber: Subscriber,
    file: File,
    offset: u64,
    index: Box<dyn RecordIndex>,
    log: LogHandle,
}

impl RecorderEngine {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        return;
                    };

                    match command {
                        RecorderCommand::Ready { respond_to } => {
                            let _ = respond_to.send(());
                        }

                        RecorderCommand::Add { publish, respond_to } => {
                            // acknowledged either way; a dead source only
                            // means nothing to record from it
                            if let Err(e) = self.subscriber.add(&publish).await {
                                self.log.warn(format!(
                                    "unable to subscribe {publish}: {e}"
                                ));
                            } else {
                                self.log.info(format!("recording from {publish}"));
                            }
                            let _ = respond_to.send(());
                        }

                        RecorderCommand::End { respond_to } => {
                            if let Err(e) = self.index.close().await {
                                self.log.warn(format!("unable to close index: {e}"));
                            }
                            let _ = self.file.flush().await;
                            let _ = respond_to.send(());
                            return;
                        }
                    }
                }

                message = self.subscriber.recv() => {
                    if let Some(message) = message {
                        self.record(message).await;
                    }
                }
            }
        }
    }

    /// Index and append one received report. Malformed frames and index
    /// failures are logged and the record skipped; the capture continues.
    async fn record(&mut self, message: Message) {
        let (topic, report) = match ProbeReport::from_frame(&message) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.log.warn(format!("discarding unrecognized frame: {e}"));
                return;
            }
        };

        let payload = &message[1];

        let entry = IndexEntry {
            time: report.timestamp,
            uuid: report.uuid,
            probe: topic,
            tag: report.tag.clone(),
            index: report.index,
            // the length prefix sits at the current offset; the payload
            // starts four bytes in
            offset: self.offset + 4,
            size: payload.len() as u64,
        };

        if let Err(e) = self.index.insert(&entry).await {
            self.log.error(format!("unable to index record: {e}"));
            return;
        }

        if let Err(e) = self.write_record(payload).await {
            self.log.error(format!("unable to write record: {e}"));
            return;
        }

        self.offset += 4 + payload.len() as u64;
    }

    async fn write_record(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.file.write_u32(payload.len() as u32).await?;
        self.file.write_all(payload).await?;
        self.file.flush().await
    }
}

/// Front of a running recorder task.
pub struct Recorder {
    tx: mpsc::Sender<RecorderCommand>,
    task: JoinHandle<()>,
}

impl Recorder {
    /// Create the data file, subscribe to all topics and start recording.
    pub async fn start(
        output: impl AsRef<Path>,
        index: Box<dyn RecordIndex>,
        log: LogHandle,
    ) -> Result<Self> {
        let file = File::create(output.as_ref()).await.map_err(|e| {
            Error::Transport(format!(
                "unable to create {}: {e}",
                output.as_ref().display()
            ))
        })?;

        let mut subscriber = Subscriber::new();
        subscriber.subscribe_all().await;

        let (tx, command_rx) = mpsc::channel(32);

        let engine = RecorderEngine {
            command_rx,
            subscriber,
            file,
            offset: 0,
            index,
            log,
        };

        let task = tokio::spawn(engine.run());

        let recorder = Self { tx, task };
        recorder.ready().await?;

        Ok(recorder)
    }

    async fn ready(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(RecorderCommand::Ready { respond_to })
            .await
            .map_err(|_| Error::Transport("recorder task is gone".to_string()))?;

        match timeout(READY_TIMEOUT, response).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Transport("recorder task is gone".to_string())),
            Err(_) => Err(Error::Bootstrap(format!(
                "recorder did not report ready within {READY_TIMEOUT:?}"
            ))),
        }
    }

    /// Attach a publish endpoint to record from.
    pub async fn add(&self, publish: Endpoint) -> Result<()> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(RecorderCommand::Add {
                publish,
                respond_to,
            })
            .await
            .map_err(|_| Error::Transport("recorder task is gone".to_string()))?;

        response
            .await
            .map_err(|_| Error::Transport("recorder task is gone".to_string()))
    }

    /// Flush, close the index and stop.
    pub async fn shutdown(self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();

        self.tx
            .send(RecorderCommand::End { respond_to })
            .await
            .map_err(|_| Error::Transport("recorder task is gone".to_string()))?;

        response
            .await
            .map_err(|_| Error::Transport("recorder task is gone".to_string()))?;

        let _ = self.task.await;
        Ok(())
    }
}
