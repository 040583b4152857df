//! Cluster command implementation.

use super::{nodes, wait_for_ctrl_c, CliResult};
use clap::{Parser, Subcommand};
use shoplist_node::{Node, NodeConfig};
use shoplist_protocol::NodeInfo;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::{info, warn};

/// Builds the configuration of the `index`-th node of a local cluster.
///
/// Nodes are named `s{shard}r{replica}`. With a base port, node `index`
/// takes `base + 3 * index` and the two ports after it.
pub fn node_config(
    shard: u32,
    replica: u32,
    shards: u32,
    index: usize,
    host: &str,
    base_port: Option<u16>,
    data_dir: Option<&Path>,
) -> CliResult<NodeConfig> {
    let id = format!("s{shard}r{replica}");
    let mut config = NodeConfig::new(id.as_str(), shard, shards).with_host(host);

    if let Some(base) = base_port {
        let first = index
            .checked_mul(3)
            .and_then(|offset| u16::try_from(offset).ok())
            .and_then(|offset| base.checked_add(offset))
            .filter(|first| first.checked_add(2).is_some())
            .ok_or("port range exhausted")?;
        config = config.with_ports(first, first + 1, first + 2);
    }
    if let Some(dir) = data_dir {
        config = config.with_db_path(dir.join(format!("{id}.log")));
    }
    Ok(config)
}

/// A line typed at the cluster prompt.
#[derive(Debug, Parser)]
#[command(multicall = true)]
pub struct Prompt {
    #[command(subcommand)]
    pub command: ClusterCommand,
}

/// Commands understood by the cluster prompt.
#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum ClusterCommand {
    /// Start a new replica in a shard
    Add {
        /// Shard the replica serves
        shard: u32,
    },

    /// Stop a running replica; its ports and data file stay reserved
    Stop {
        /// Node id, e.g. s0r1
        id: String,
    },

    /// Restart a stopped replica on its old ports
    Start {
        /// Node id
        id: String,
    },

    /// Stop a replica and forget it
    Remove {
        /// Node id
        id: String,
    },

    /// List the replicas this process manages
    #[command(alias = "ls")]
    List,

    /// Print the membership view of a replica
    Peers {
        /// Node id; the first running replica if omitted
        id: Option<String>,
    },

    /// Stop every replica and exit
    #[command(alias = "exit")]
    Quit,
}

impl ClusterCommand {
    /// Parses one prompt line. Blank lines yield `None`.
    ///
    /// # Errors
    ///
    /// A clap error describing the bad input, or the rendered help.
    pub fn parse_line(line: &str) -> Result<Option<Self>, clap::Error> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        Prompt::try_parse_from(words).map(|prompt| Some(prompt.command))
    }
}

/// The replicas of a local cluster and the settings new ones are made with.
pub struct ClusterManager {
    shards: u32,
    host: String,
    base_port: Option<u16>,
    data_dir: Option<PathBuf>,
    nodes: BTreeMap<String, Node>,
    created: usize,
    per_shard: BTreeMap<u32, u32>,
}

impl ClusterManager {
    /// Creates a manager with no replicas.
    pub fn new(shards: u32, host: &str, base_port: Option<u16>, data_dir: Option<&Path>) -> Self {
        Self {
            shards,
            host: host.to_string(),
            base_port,
            data_dir: data_dir.map(Path::to_path_buf),
            nodes: BTreeMap::new(),
            created: 0,
            per_shard: BTreeMap::new(),
        }
    }

    /// Managed replicas in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// The replica with `id`, if managed.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn node_mut(&mut self, id: &str) -> CliResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| format!("no node named {id}").into())
    }

    /// Infos of the running replicas, used as bootstrap peers.
    fn seeds(&self) -> Vec<NodeInfo> {
        self.nodes
            .values()
            .filter(|node| node.is_running())
            .map(|node| node.info().clone())
            .collect()
    }

    /// Starts a new replica in `shard` and returns its id.
    pub fn add(&mut self, shard: u32) -> CliResult<String> {
        if shard >= self.shards {
            return Err(format!("shard {shard} out of range (0..{})", self.shards).into());
        }
        let replica = self.per_shard.get(&shard).copied().unwrap_or(0);
        let config = node_config(
            shard,
            replica,
            self.shards,
            self.created,
            &self.host,
            self.base_port,
            self.data_dir.as_deref(),
        )?
        .with_peers(self.seeds());

        let mut node = Node::new(config)?;
        node.start()?;
        self.created += 1;
        self.per_shard.insert(shard, replica + 1);

        let id = node.id().to_string();
        info!(node_id = %id, shard, client = %node.client_addr(), "node added");
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Stops the replica `id`.
    pub fn stop(&mut self, id: &str) -> CliResult<()> {
        self.node_mut(id)?.stop()?;
        Ok(())
    }

    /// Brings a stopped replica back on the ports it had, with the running
    /// replicas as bootstrap peers.
    pub fn start(&mut self, id: &str) -> CliResult<()> {
        let seeds: Vec<NodeInfo> = self
            .seeds()
            .into_iter()
            .filter(|info| info.node_id != id)
            .collect();
        let node = self.node_mut(id)?;
        if node.is_running() {
            return Err(format!("{id} is already running").into());
        }
        // Releases the sockets and the store of a node that never ran
        node.stop()?;

        let info = node.info();
        let config = node
            .config()
            .clone()
            .with_ports(info.client_port, info.gossip_pull_port, info.discovery_pull_port)
            .with_peers(seeds);
        let mut restarted = Node::new(config)?;
        restarted.start()?;
        *node = restarted;
        Ok(())
    }

    /// Stops the replica `id` and drops it from the cluster.
    pub fn remove(&mut self, id: &str) -> CliResult<()> {
        let mut node = self
            .nodes
            .remove(id)
            .ok_or_else(|| format!("no node named {id}"))?;
        node.stop()?;
        Ok(())
    }

    /// Stops every replica, reporting the first failure.
    pub fn shutdown(&mut self) -> CliResult<()> {
        info!(nodes = self.nodes.len(), "shutting down cluster");
        let mut first_error = None;
        for node in self.nodes.values_mut() {
            if let Err(e) = node.stop() {
                warn!(node_id = %node.id(), error = %e, "node failed to stop cleanly");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Runs one prompt command. Returns false once the prompt should exit.
    pub fn execute(&mut self, command: ClusterCommand) -> CliResult<bool> {
        match command {
            ClusterCommand::Add { shard } => {
                let id = self.add(shard)?;
                if let Some(node) = self.node(&id) {
                    print_node(node);
                }
            }
            ClusterCommand::Stop { id } => {
                self.stop(&id)?;
                println!("{id} stopped");
            }
            ClusterCommand::Start { id } => {
                self.start(&id)?;
                println!("{id} running");
            }
            ClusterCommand::Remove { id } => {
                self.remove(&id)?;
                println!("{id} removed");
            }
            ClusterCommand::List => {
                for node in self.nodes() {
                    print_node(node);
                }
                println!("{} node(s)", self.nodes.len());
            }
            ClusterCommand::Peers { id } => {
                let node = match &id {
                    Some(id) => self.node(id),
                    None => self.nodes().find(|node| node.is_running()),
                }
                .ok_or("no such running node")?;
                if !node.is_running() {
                    return Err(format!("{} is not running", node.id()).into());
                }
                for peer in nodes::fetch(&node.client_addr())? {
                    println!(
                        "  {:<8} shard {:<3} {:<22} last seen {}",
                        peer.node_id,
                        peer.shard_id,
                        peer.client_addr(),
                        peer.last_seen_ts
                    );
                }
            }
            ClusterCommand::Quit => return Ok(false),
        }
        Ok(true)
    }
}

fn print_node(node: &Node) {
    println!(
        "  {:<8} shard {:<3} {:<22} {:?}",
        node.id(),
        node.shard_id(),
        node.client_addr(),
        node.state()
    );
}

enum Input {
    Line(String),
    Interrupt,
}

/// Runs the cluster command.
///
/// Starts `replicas` nodes per shard, then reads prompt commands from stdin
/// until `quit` or Ctrl-C. Without a usable stdin the cluster runs until
/// Ctrl-C.
pub fn run(
    shards: u32,
    replicas: u32,
    host: &str,
    base_port: Option<u16>,
    data_dir: Option<&Path>,
) -> CliResult<()> {
    if replicas == 0 {
        return Err("a cluster needs at least one replica per shard".into());
    }
    if let Some(dir) = data_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut cluster = ClusterManager::new(shards, host, base_port, data_dir);
    for shard in 0..shards {
        for _ in 0..replicas {
            let id = cluster.add(shard)?;
            if let Some(node) = cluster.node(&id) {
                print_node(node);
            }
        }
    }

    let seeds: Vec<String> = cluster.nodes().map(Node::client_addr).collect();
    println!();
    println!("Cluster of {} node(s) running", seeds.len());
    println!("  --seeds {} --shards {shards}", seeds.join(","));
    println!("Commands: add <shard>, stop <id>, start <id>, remove <id>, list, peers [id], quit");

    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    thread::spawn(move || {
        if wait_for_ctrl_c().is_ok() {
            let _ = interrupt.send(Input::Interrupt);
        }
    });
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::Line(line)).is_err() {
                break;
            }
        }
    });

    prompt()?;
    for input in rx {
        let Input::Line(line) = input else { break };
        match ClusterCommand::parse_line(&line) {
            Ok(Some(command)) => match cluster.execute(command) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("error: {e}"),
            },
            Ok(None) => {}
            Err(e) => eprintln!("{e}"),
        }
        prompt()?;
    }

    cluster.shutdown()
}

fn prompt() -> CliResult<()> {
    print!("cluster> ");
    io::stdout().flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_laid_out_per_node() {
        let config = node_config(1, 0, 2, 3, "127.0.0.1", Some(6000), None).unwrap();
        assert_eq!(config.node_id, "s1r0");
        assert_eq!(config.client_port, 6009);
        assert_eq!(config.gossip_pull_port, 6010);
        assert_eq!(config.discovery_pull_port, 6011);
    }

    #[test]
    fn ephemeral_without_base_port() {
        let dir = Path::new("/tmp/shoplist");
        let config = node_config(0, 1, 1, 1, "127.0.0.1", None, Some(dir)).unwrap();
        assert_eq!(config.client_port, 0);
        assert_eq!(config.db_path.as_deref(), Some(dir.join("s0r1.log").as_path()));
    }

    #[test]
    fn port_overflow_is_an_error() {
        assert!(node_config(0, 0, 1, 10, "h", Some(u16::MAX - 5), None).is_err());
    }

    #[test]
    fn prompt_lines_parse_into_commands() {
        assert_eq!(
            ClusterCommand::parse_line("add 1").unwrap(),
            Some(ClusterCommand::Add { shard: 1 })
        );
        assert_eq!(
            ClusterCommand::parse_line("  stop   s0r1 ").unwrap(),
            Some(ClusterCommand::Stop { id: "s0r1".into() })
        );
        assert_eq!(
            ClusterCommand::parse_line("start s0r1").unwrap(),
            Some(ClusterCommand::Start { id: "s0r1".into() })
        );
        assert_eq!(
            ClusterCommand::parse_line("remove s1r0").unwrap(),
            Some(ClusterCommand::Remove { id: "s1r0".into() })
        );
        assert_eq!(
            ClusterCommand::parse_line("ls").unwrap(),
            Some(ClusterCommand::List)
        );
        assert_eq!(
            ClusterCommand::parse_line("peers").unwrap(),
            Some(ClusterCommand::Peers { id: None })
        );
        assert_eq!(
            ClusterCommand::parse_line("peers s0r0").unwrap(),
            Some(ClusterCommand::Peers {
                id: Some("s0r0".into())
            })
        );
        assert_eq!(
            ClusterCommand::parse_line("exit").unwrap(),
            Some(ClusterCommand::Quit)
        );
        assert_eq!(ClusterCommand::parse_line("   ").unwrap(), None);
    }

    #[test]
    fn bad_prompt_lines_are_rejected() {
        assert!(ClusterCommand::parse_line("add").is_err());
        assert!(ClusterCommand::parse_line("add one").is_err());
        assert!(ClusterCommand::parse_line("stop").is_err());
        assert!(ClusterCommand::parse_line("frobnicate").is_err());
    }

    #[test]
    fn prompt_definition_is_consistent() {
        use clap::CommandFactory;
        Prompt::command().debug_assert();
    }

    #[test]
    fn manager_adds_stops_restarts_and_removes() {
        let mut cluster = ClusterManager::new(2, "127.0.0.1", None, None);
        let first = cluster.add(0).unwrap();
        let second = cluster.add(0).unwrap();
        let other = cluster.add(1).unwrap();
        assert_eq!((first.as_str(), second.as_str(), other.as_str()), ("s0r0", "s0r1", "s1r0"));
        assert!(cluster.add(2).is_err());

        let port = cluster.node(&second).unwrap().info().client_port;
        cluster.stop(&second).unwrap();
        assert!(cluster.node(&second).unwrap().state().is_stopped());

        cluster.start(&second).unwrap();
        let restarted = cluster.node(&second).unwrap();
        assert!(restarted.is_running());
        assert_eq!(restarted.info().client_port, port);
        assert!(cluster.start(&second).is_err());

        cluster.remove(&other).unwrap();
        assert!(cluster.node(&other).is_none());
        assert!(cluster.stop("s9r9").is_err());
        assert!(cluster
            .execute(ClusterCommand::Remove { id: other })
            .is_err());

        assert!(!cluster.execute(ClusterCommand::Quit).unwrap());
        cluster.shutdown().unwrap();
        assert!(cluster.nodes().all(|node| node.state().is_stopped()));
    }
}
