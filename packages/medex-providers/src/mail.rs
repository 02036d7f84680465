//! HTTP mail relay client.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use medex_domain::mail::OutgoingMail;

use crate::{Error, Result};

#[derive(Debug, Serialize)]
struct RelayAttachment<'a> {
	filename: &'a str,
	content_type: &'a str,
	content_base64: String,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
	from: &'a str,
	to: [&'a str; 1],
	subject: &'a str,
	html: &'a str,
	attachments: Vec<RelayAttachment<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
	/// Identifier assigned by the relay, when it reports one.
	pub message_id: Option<String>,
}

pub async fn send(cfg: &medex_config::Mail, mail: &OutgoingMail) -> Result<Delivery> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = relay_body(&cfg.sender, mail);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let status = res.status();

	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Rejected { status: status.as_u16(), body: clip(&body) });
	}

	let raw = res.text().await?;

	Ok(parse_delivery(&raw))
}

fn relay_body<'a>(sender: &'a str, mail: &'a OutgoingMail) -> RelayMessage<'a> {
	RelayMessage {
		from: sender,
		to: [mail.to.as_str()],
		subject: &mail.subject,
		html: &mail.html,
		attachments: mail
			.attachments
			.iter()
			.map(|attachment| RelayAttachment {
				filename: &attachment.filename,
				content_type: &attachment.content_type,
				content_base64: STANDARD.encode(&attachment.content),
			})
			.collect(),
	}
}

fn parse_delivery(raw: &str) -> Delivery {
	let message_id = serde_json::from_str::<Value>(raw).ok().and_then(|json| {
		json.get("id").or_else(|| json.get("message_id")).and_then(|v| v.as_str()).map(str::to_string)
	});

	Delivery { message_id }
}

fn clip(body: &str) -> String {
	body.chars().take(200).collect()
}
