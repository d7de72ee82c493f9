use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use flora_caps::Caps;
use flora_client::{GetResponse, MsgClass, Reply};
use serde::Serialize;
use serde_json::Value;

use crate::payload::{caps_to_json, caps_to_text};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Text
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DeliveryOutput<'a> {
    kind: &'static str,
    topic: &'a str,
    class: &'static str,
    payload: Value,
    timestamp: String,
}

#[derive(Serialize)]
struct ReplyOutput {
    code: i32,
    extra: Option<String>,
    payload: Value,
}

#[derive(Serialize)]
struct GetOutput<'a> {
    kind: &'static str,
    topic: &'a str,
    code: i32,
    timed_out: bool,
    replies: Vec<ReplyOutput>,
}

pub fn class_name(class: MsgClass) -> &'static str {
    match class {
        MsgClass::Instant => "instant",
        MsgClass::Request => "request",
    }
}

/// Print one inbound post or request.
pub fn print_delivery(topic: &str, class: MsgClass, mut payload: Caps, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DeliveryOutput {
                kind: "delivery",
                topic,
                class: class_name(class),
                payload: caps_to_json(&mut payload).unwrap_or(Value::Null),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => {
            let text = caps_to_text(&mut payload).unwrap_or_else(|err| format!("<{err}>"));
            println!("{topic} [{}] {text}", class_name(class));
        }
    }
}

/// Print the replies collected by `get`.
pub fn print_replies(topic: &str, response: GetResponse, format: OutputFormat) {
    let code = response.code();
    let timed_out = response.timed_out;
    match format {
        OutputFormat::Json => {
            let replies = response.replies.into_iter().map(reply_json).collect();
            let out = GetOutput {
                kind: "replies",
                topic,
                code,
                timed_out,
                replies,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "FROM", "CODE", "PAYLOAD"]);
            for (index, mut reply) in response.replies.into_iter().enumerate() {
                table.add_row(vec![
                    (index + 1).to_string(),
                    reply.extra.take().unwrap_or_else(|| "-".to_string()),
                    reply.ret_code.to_string(),
                    caps_to_text(&mut reply.payload).unwrap_or_else(|err| format!("<{err}>")),
                ]);
            }
            println!("{table}");
            if timed_out {
                println!("(timed out waiting for more replies)");
            }
        }
    }
}

fn reply_json(mut reply: Reply) -> ReplyOutput {
    ReplyOutput {
        code: reply.ret_code,
        extra: reply.extra,
        payload: caps_to_json(&mut reply.payload).unwrap_or(Value::Null),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
