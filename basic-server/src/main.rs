use std::{env, process, sync::Arc};

use scripthub_snapshot_adapter_fs::SnapshotAdapterFs;

/// Environment configuration:
/// - `PORT` - listening port (default 4000)
/// - `CORS_ORIGIN` - allowed studio origin (default http://localhost:3000)
/// - `TOKEN_SECRET` - shared secret for token verification (required)
/// - `SNAPSHOT_DIR` - snapshot store directory; unset disables persistence
#[tokio::main]
async fn main() {
	let port = env::var("PORT").unwrap_or_else(|_| "4000".to_string());
	let cors_origin =
		env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
	let Ok(token_secret) = env::var("TOKEN_SECRET") else {
		eprintln!("FATAL: TOKEN_SECRET is not set");
		process::exit(1);
	};

	let mut builder = scripthub::Builder::new();
	builder
		.listen(format!("0.0.0.0:{}", port))
		.cors_origin(cors_origin)
		.token_secret(token_secret);

	match env::var("SNAPSHOT_DIR") {
		Ok(snapshot_dir) => match SnapshotAdapterFs::new(snapshot_dir).await {
			Ok(adapter) => {
				builder.snapshot_adapter(Arc::new(adapter));
			}
			Err(e) => {
				eprintln!("FATAL: failed to open snapshot directory: {}", e);
				process::exit(1);
			}
		},
		Err(_) => {
			// Collaborative editing still works, rooms just start empty
			eprintln!("SNAPSHOT_DIR not set - persistence disabled");
		}
	}

	if let Err(e) = builder.run().await {
		eprintln!("FATAL: {}", e);
		process::exit(1);
	}
}

// vim: ts=4
