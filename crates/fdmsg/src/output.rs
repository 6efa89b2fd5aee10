use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use fdmsg_channel::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    schema_id: &'a str,
    msg_type: u32,
    peer_id: u32,
    sender_pid: u32,
    payload_size: usize,
    payload: String,
    descriptor: bool,
    timestamp: String,
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                schema_id: "https://schemas.3leaps.dev/fdmsg/cli/v1/message-received.schema.json",
                msg_type: msg.msg_type,
                peer_id: msg.peer_id,
                sender_pid: msg.sender_pid,
                payload_size: msg.payload.len(),
                payload: payload_preview(msg.payload.as_ref()),
                descriptor: msg.descriptor.is_some(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "PEER", "PID", "SIZE", "FD", "PAYLOAD"])
                .add_row(vec![
                    msg.msg_type.to_string(),
                    msg.peer_id.to_string(),
                    msg.sender_pid.to_string(),
                    msg.payload.len().to_string(),
                    if msg.descriptor.is_some() { "yes" } else { "no" }.to_string(),
                    payload_preview(msg.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Raw => {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(msg.payload.as_ref());
            let _ = stdout.write_all(b"\n");
        }
    }
}

const PREVIEW_LIMIT: usize = 256;

fn payload_preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    if text.len() > PREVIEW_LIMIT {
        let mut cut = PREVIEW_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…(+{} bytes)", &text[..cut], text.len() - cut)
    } else {
        text.into_owned()
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
