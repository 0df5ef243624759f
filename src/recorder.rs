// ===============================
// src/recorder.rs
// ===============================
//
// Journal JSONL untuk satu run:
// - Tiap Event (stage, submit, confirm, mint, skip, gagal) ditulis satu baris.
// - BufWriter, flush periodik tiap 1s dan tiap 256 event.
// - Parent directory dibuat otomatis.
// - Kalau tulis gagal, file dibuka ulang sekali; kalau tetap gagal, event dibuang.
//
// ENV: `RECORD_FILE=/path/to/run.jsonl` (lihat main.rs).
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;
use crate::error::Result;

const FLUSH_EVERY_N_EVENTS: u32 = 256;

async fn open_writer(path: &str) -> Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

fn encode_line(ev: &Event) -> Option<Vec<u8>> {
    match serde_json::to_vec(ev) {
        Ok(mut line) => {
            line.push(b'\n');
            Some(line)
        }
        Err(e) => {
            error!(?e, "recorder: serialize error, skip event");
            None
        }
    }
}

/// Drains `rx` into `path` until every sender is dropped.
pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) -> Result<()> {
    let mut writer = open_writer(&path).await?;
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    // semua sender sudah drop: flush lalu keluar
                    writer.flush().await?;
                    info!("recorder: channel closed, stopped");
                    return Ok(());
                };
                let Some(line) = encode_line(&ev) else { continue };

                if let Err(e) = writer.write_all(&line).await {
                    error!(?e, "recorder: write failed, reopening");
                    writer = open_writer(&path).await?;
                    if let Err(e2) = writer.write_all(&line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}
