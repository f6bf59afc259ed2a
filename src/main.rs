use std::collections::HashMap;
use std::time::Duration;

use courier::actor_system::{
    Actor, ActorContext, ActorError, ActorSystem, Message, async_trait,
};
use courier::{Deferred, Promise, RuntimeConfig};
use serde::Serialize;

const CHUNK_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum Transfer {
    Upload { file: String, content: Vec<u8> },
    StoreChunk { file: String, index: usize, bytes: Vec<u8>, checksum: u32 },
    Stored { file: String, index: usize },
}

#[derive(Debug, Clone, Serialize)]
struct UploadReport {
    file: String,
    chunks: usize,
    bytes: usize,
    checksums: Vec<u32>,
}

fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32))
}

/// Splits uploads into chunks and hands them to its `store` child.
struct UploadActor {
    pending: HashMap<String, usize>,
    done: Deferred<String>,
}

#[async_trait]
impl Actor<Transfer> for UploadActor {
    async fn before_start(&mut self, ctx: &mut ActorContext<Transfer>) -> Result<(), ActorError> {
        // a restarted parent finds its child still registered
        match ctx.actor_of("store", StoreActor::default).await {
            Ok(_) | Err(ActorError::Exists(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn receive(
        &mut self,
        message: Message<Transfer>,
        ctx: &mut ActorContext<Transfer>,
    ) -> Result<(), ActorError> {
        match message.into_body() {
            Transfer::Upload { file, content } => {
                let chunks: Vec<Vec<u8>> = content.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
                self.pending.insert(file.clone(), chunks.len());
                for (index, bytes) in chunks.into_iter().enumerate() {
                    // checksums are computed off the actor, like any other I/O step
                    let sum = Promise::of({
                        let bytes = bytes.clone();
                        move |deferred: &Deferred<u32>| Ok(deferred.resolve(checksum(&bytes))?)
                    })
                    .outcome()
                    .await
                    .map_err(ActorError::new)?;
                    ctx.tell(Message::new(
                        ctx.child("store"),
                        Transfer::StoreChunk { file: file.clone(), index, bytes, checksum: sum },
                    ));
                }
            }
            Transfer::Stored { file, index } => {
                log::debug!("Chunk {index} of '{file}' stored");
                let remaining = self.pending.entry(file.clone()).or_default();
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    self.pending.remove(&file);
                    self.done.resolve(file).map_err(ActorError::new)?;
                }
            }
            other => log::warn!("Unexpected message {other:?}"),
        }
        Ok(())
    }
}

#[derive(Default)]
struct StoreActor {
    files: HashMap<String, Vec<(usize, Vec<u8>, u32)>>,
}

#[async_trait]
impl Actor<Transfer> for StoreActor {
    async fn receive(
        &mut self,
        message: Message<Transfer>,
        ctx: &mut ActorContext<Transfer>,
    ) -> Result<(), ActorError> {
        if let Transfer::StoreChunk { file, index, bytes, checksum: sum } = message.body().clone() {
            if checksum(&bytes) != sum {
                return Err(ActorError::msg(format!("corrupt chunk {index} of '{file}'")));
            }
            self.files.entry(file.clone()).or_default().push((index, bytes, sum));
            ctx.tell(message.reply_with(Transfer::Stored { file, index }));
        }
        Ok(())
    }

    async fn after_stop(&mut self, _ctx: &mut ActorContext<Transfer>) {
        for (file, chunks) in &self.files {
            log::info!("'{}' kept {} chunk(s)", file, chunks.len());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = RuntimeConfig::from_env();
    log::info!("Starting with {:?}", config);

    let system = ActorSystem::<Transfer>::from_config(&config)?;
    let done = Deferred::new();
    let factory_done = done.clone();
    let uploads = system
        .actor_of("uploads", move || UploadActor {
            pending: HashMap::new(),
            done: factory_done.clone(),
        })
        .await?;
    system.start()?;

    let content = b"chunked content travelling through actors".to_vec();
    let key = system.tell(Message::new(
        uploads,
        Transfer::Upload { file: "report.txt".to_string(), content: content.clone() },
    ));
    log::info!("Upload submitted under {key}");

    let report = done.promise().map(move |file| {
        let checksums = content.chunks(CHUNK_SIZE).map(checksum).collect::<Vec<_>>();
        Ok(UploadReport { file, chunks: checksums.len(), bytes: content.len(), checksums })
    });
    let report = tokio::time::timeout(Duration::from_secs(10), report.outcome()).await??;
    println!("{}", serde_json::to_string_pretty(&report)?);

    system.shutdown().await;
    Ok(())
}
