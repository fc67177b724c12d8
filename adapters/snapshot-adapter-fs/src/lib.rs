//! Filesystem-backed snapshot store adapter.
//!
//! Stores one JSON record per room under the base directory. The record
//! wraps the opaque CRDT payload in base64 together with the save time and
//! payload size, so operational tooling can inspect snapshots without
//! decoding them. Room names are arbitrary UTF-8, so file stems are the
//! URL-safe base64 of the name, which keeps the mapping reversible for
//! `list()`.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64, engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL};
use std::path::{Path, PathBuf};

use scripthub_types::prelude::*;
use scripthub_types::snapshot_adapter::{SnapshotAdapter, SnapshotRecord};

const RECORD_EXT: &str = "json";

#[derive(Debug)]
pub struct SnapshotAdapterFs {
	base_dir: Box<Path>,
}

impl SnapshotAdapterFs {
	pub async fn new(base_dir: impl Into<PathBuf>) -> HubResult<Self> {
		let base_dir: PathBuf = base_dir.into();
		tokio::fs::create_dir_all(&base_dir).await?;
		Ok(Self { base_dir: base_dir.into() })
	}

	fn record_path(&self, name: &str) -> PathBuf {
		let stem = BASE64_URL.encode(name.as_bytes());
		self.base_dir.join(format!("{}.{}", stem, RECORD_EXT))
	}
}

#[async_trait]
impl SnapshotAdapter for SnapshotAdapterFs {
	async fn load(&self, name: &str) -> HubResult<Option<Vec<u8>>> {
		let path = self.record_path(name);
		let raw = match tokio::fs::read(&path).await {
			Ok(raw) => raw,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let record: SnapshotRecord = serde_json::from_slice(&raw)?;
		let data = BASE64.decode(record.data.as_bytes()).map_err(|e| {
			warn!("Corrupt snapshot payload for {}: {}", name, e);
			Error::Parse
		})?;
		debug!("Loaded snapshot for {} ({} bytes)", name, data.len());
		Ok(Some(data))
	}

	async fn save(&self, name: &str, data: &[u8]) -> HubResult<()> {
		let record = SnapshotRecord {
			data: BASE64.encode(data),
			saved_at: Timestamp::now(),
			size: data.len() as u64,
		};
		let raw = serde_json::to_vec(&record)?;

		// Write-then-rename keeps a concurrent load from seeing a torn record
		let path = self.record_path(name);
		let tmp_path = path.with_extension("tmp");
		tokio::fs::write(&tmp_path, &raw).await?;
		tokio::fs::rename(&tmp_path, &path).await?;
		debug!("Saved snapshot for {} ({} bytes)", name, data.len());
		Ok(())
	}

	async fn delete(&self, name: &str) -> HubResult<()> {
		match tokio::fs::remove_file(self.record_path(name)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn list(&self) -> HubResult<Vec<Box<str>>> {
		let mut names = Vec::new();
		let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
			let Ok(decoded) = BASE64_URL.decode(stem.as_bytes()) else {
				debug!("Skipping foreign file in snapshot dir: {}", path.display());
				continue;
			};
			if let Ok(name) = String::from_utf8(decoded) {
				names.push(name.into());
			}
		}
		names.sort();
		Ok(names)
	}
}

// vim: ts=4
