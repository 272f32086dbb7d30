//! CLI commands for the alias ledger
//!
//! Implements all command handlers for the CLI interface.

use crate::alias::{get_record, list_aliases, Claim, Registrar, ResolveError};
use crate::api::{create_router, ApiState};
use crate::core::{timestamp_to_string, Channel, ALIAS_CHANNEL};
use crate::crypto::{
    encode_base64url, KeyPair, PublicKeyFormat, SignatureAlgorithm, MIN_PSS_KEY_BYTES,
};
use crate::network::Node;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

fn alias_channel(node: &Node) -> Channel {
    node.channel(ALIAS_CHANNEL)
}

/// Generate an RSA key pair, saving the private key as PEM
pub fn cmd_keygen(output: &Path, bits: usize, format: PublicKeyFormat) -> CliResult<()> {
    if output.exists() {
        println!("⚠️  Key file already exists at {:?}", output);
        return Ok(());
    }

    if bits < MIN_PSS_KEY_BYTES * 8 {
        println!(
            "⚠️  {}-bit keys can only sign with {}",
            bits,
            SignatureAlgorithm::Sha512WithRsa
        );
    }

    println!("🔑 Generating {}-bit RSA key...", bits);
    let key = KeyPair::generate(bits)?;
    fs::write(output, key.to_pem()?)?;

    println!("✅ Key saved to {:?}", output);
    println!("   Public key ({}):", format);
    println!("   {}", encode_base64url(&key.public_key_bytes(format)?));

    Ok(())
}

/// Register an alias for the key in `key_file` through the local node
pub async fn cmd_register(
    node: Arc<Node>,
    live_flag: Option<String>,
    name: &str,
    key_file: &Path,
    format: PublicKeyFormat,
    algorithm: SignatureAlgorithm,
) -> CliResult<()> {
    let key = KeyPair::from_pem(&fs::read_to_string(key_file)?)?;
    let claim = Claim::signed(name, &key, format, algorithm)?;

    println!("📝 Registering alias {}...", name);
    let registrar = Registrar::new(node).with_live_flag(live_flag);
    let registration = registrar.register(&claim).await?;

    println!("✅ Alias registered!");
    println!("   ├─ Alias: {}", registration.alias.alias);
    println!("   ├─ Timestamp: {}", timestamp_to_string(registration.timestamp));
    println!("   ├─ Record: {}", &hex::encode(&registration.record_hash)[..16]);
    println!(
        "   └─ Block: {} (length {})",
        &hex::encode(&registration.block_hash)[..16],
        registration.block_length
    );

    Ok(())
}

/// Look up an alias
pub async fn cmd_lookup(node: &Node, name: &str) -> CliResult<()> {
    let channel = alias_channel(node);
    if let Err(e) = node.pull(&channel).await {
        log::warn!("Looking up {} in a possibly stale ledger: {}", name, e);
    }

    match get_record(&channel, node.cache.as_ref(), name) {
        Ok((record, alias)) => {
            println!("🔎 {}", alias.alias);
            println!("   ├─ Registered: {}", timestamp_to_string(record.timestamp));
            println!("   ├─ Format: {}", alias.public_format);
            println!("   └─ Public key: {}", encode_base64url(&alias.public_key));
        }
        Err(ResolveError::NotFound(_)) => {
            println!("❌ Alias {} is not registered", name);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// List every registered alias
pub async fn cmd_list(node: &Node) -> CliResult<()> {
    let channel = alias_channel(node);
    if let Err(e) = node.pull(&channel).await {
        log::warn!("Listing a possibly stale ledger: {}", e);
    }

    let entries = list_aliases(&channel, node.cache.as_ref())?;
    println!(
        "📋 {} alias(es) on {} (length {})",
        entries.len(),
        channel.name,
        channel.length(node.cache.as_ref())?
    );
    for entry in &entries {
        println!(
            "   {} - {} [{}]",
            timestamp_to_string(entry.record.timestamp),
            entry.alias.alias,
            &hex::encode(&entry.block_hash)[..16]
        );
    }

    Ok(())
}

/// Run the HTTP server, and the peer server if a peer port is configured
pub async fn cmd_start(
    node: Arc<Node>,
    server: ServerConfig,
    live_flag: Option<String>,
) -> CliResult<()> {
    let channel = alias_channel(&node);

    if let Err(e) = node.pull(&channel).await {
        log::warn!("Initial pull of {} failed: {}", channel.name, e);
    }

    if let Some(peer_server) = node.peer_server(&server.host, vec![channel.clone()]).await? {
        println!("🌐 Peer server listening on {}", peer_server.local_addr()?);
        tokio::spawn(async move {
            if let Err(e) = peer_server.run().await {
                log::error!("Peer server error: {}", e);
            }
        });
    }
    if !node.config.peers.is_empty() {
        println!("   Syncing with peers: {:?}", node.config.peers);
    }

    let registrar = Registrar::new(node).with_live_flag(live_flag);
    let app = create_router(ApiState::new(registrar));

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("🚀 Alias server starting on http://{}", addr);
    println!();
    println!("📖 Available endpoints:");
    println!("   GET  /health                      - Health check");
    println!("   GET  /alias?alias=<name>          - Look up an alias");
    println!("   GET  /aliases                     - List aliases");
    println!("   GET  /alias-register              - Registration form data");
    println!("   POST /alias-register              - Register an alias");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            println!("\n📴 Shutting down alias server...");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NodeConfig;

    fn test_node(dir: &tempfile::TempDir) -> Arc<Node> {
        Arc::new(
            Node::open(NodeConfig {
                data_dir: dir.path().join("ledger"),
                threshold: 0,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_keygen_register_lookup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key_file = temp_dir.path().join("alice.pem");
        cmd_keygen(&key_file, 2048, PublicKeyFormat::Pkix).unwrap();
        assert!(key_file.exists());

        let node = test_node(&temp_dir);
        cmd_register(
            node.clone(),
            None,
            "Alice",
            &key_file,
            PublicKeyFormat::Pkix,
            SignatureAlgorithm::Sha512WithRsaPss,
        )
        .await
        .unwrap();

        let key = KeyPair::from_pem(&fs::read_to_string(&key_file).unwrap()).unwrap();
        let (_, alias) = get_record(&alias_channel(&node), node.cache.as_ref(), "Alice").unwrap();
        assert_eq!(alias.public_key, key.public_key_bytes(PublicKeyFormat::Pkix).unwrap());

        cmd_lookup(&node, "Alice").await.unwrap();
        cmd_lookup(&node, "Nobody").await.unwrap();
        cmd_list(&node).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key_file = temp_dir.path().join("key.pem");
        cmd_keygen(&key_file, 1024, PublicKeyFormat::Pkcs1WithRsa).unwrap();
        let node = test_node(&temp_dir);

        for expect_ok in [true, false] {
            let result = cmd_register(
                node.clone(),
                Some("1".to_string()),
                "bob",
                &key_file,
                PublicKeyFormat::Pkcs1WithRsa,
                SignatureAlgorithm::Sha512WithRsa,
            )
            .await;
            assert_eq!(result.is_ok(), expect_ok);
        }
    }
}
