//! Nodes command implementation.

use super::CliResult;
use shoplist_client::{ClientConfig, ReplicaTransport, TcpReplicaTransport};
use shoplist_crdt::now_millis;
use shoplist_protocol::{Message, NodeInfo, OpType};

/// Origin used for requests the CLI makes outside of the list API.
const ORIGIN: &str = "shoplist-cli";

/// Asks the replica at `endpoint` for its membership view.
pub fn fetch(endpoint: &str) -> CliResult<Vec<NodeInfo>> {
    let transport = TcpReplicaTransport::new(ClientConfig::default());
    let reply = transport.request(endpoint, &Message::get_nodes(ORIGIN, now_millis()))?;
    transport.close();

    if reply.op != OpType::NodesResponse {
        return Err(format!("unexpected {:?} reply from {endpoint}", reply.op).into());
    }
    let mut nodes = reply.nodes;
    nodes.sort_by(|a, b| (a.shard_id, &a.node_id).cmp(&(b.shard_id, &b.node_id)));
    Ok(nodes)
}

/// Runs the nodes command.
pub fn run(endpoint: &str, format: &str) -> CliResult<()> {
    let nodes = fetch(endpoint)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }

    println!("Membership view of {endpoint}");
    println!();
    println!(
        "  {:<16} {:>5}  {:<22} {:>7} {:>9}  {:>13}",
        "NODE", "SHARD", "CLIENT", "GOSSIP", "DISCOVERY", "LAST SEEN"
    );
    for node in &nodes {
        println!(
            "  {:<16} {:>5}  {:<22} {:>7} {:>9}  {:>13}",
            node.node_id,
            node.shard_id,
            node.client_addr(),
            node.gossip_pull_port,
            node.discovery_pull_port,
            node.last_seen_ts
        );
    }
    println!();
    println!("{} node(s)", nodes.len());
    Ok(())
}
