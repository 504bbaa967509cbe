// ofpath: Planning Paths and Compiling them into OpenFlow Rules
// Copyright (C) 2021  The ofpath developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use ofpath::control::{ControlPlane, MemoryDataPlane};
use ofpath::flows::{compile, PathId};
use ofpath::planner::{AlgorithmKind, PathRequest};
use ofpath::session::{SessionManager, SessionOptions};
use ofpath::topology::{TopologyDescription, TopologyGraph};
use ofpath_runtime::config::RuntimeConfig;
use ofpath_runtime::ovs_conn::OvsConnection;

use clap::{Parser, Subcommand};
use log::*;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();

    // run clap
    let args = CommandLineArguments::parse();

    match args.cmd {
        MainCommand::Plan { topology, source, destination, algorithm, sequence, dump } => {
            let graph = load_topology(&topology)?;
            if dump {
                println!("{}", graph.describe().to_json()?);
            }
            let request = PathRequest {
                source,
                destination,
                algorithm,
                manual_sequence: sequence
                    .map(|s| s.split(',').map(|n| n.trim().to_string()).collect()),
            };
            let (source, destination, algorithm) = request.resolve(&graph)?;
            let path = algorithm.plan(&graph, source, destination)?;
            let rules = compile(&graph, &path, PathId(0))?;
            println!("{} path: {}", algorithm.kind(), path.fmt_path(&graph));
            for rule in rules.iter() {
                println!("    {}", rule);
            }
        }
        MainCommand::Run { topology, requests, config, threads, dry_run, keep, stats, json } => {
            let graph = load_topology(&topology)?;
            let requests: Vec<PathRequest> =
                serde_json::from_str(&std::fs::read_to_string(&requests)?)?;
            let config = load_config(config)?;
            let mut options = config.session_options();
            // the command line overrides the configuration file
            options.parallelism = threads.or(config.parallelism).unwrap_or_else(num_cpus::get);
            info!("Installing with {} threads", options.parallelism);

            if dry_run {
                let plane = Arc::new(MemoryDataPlane::for_topology(&graph));
                let result =
                    run_session(&graph, &requests, plane.clone(), options, keep, stats, json);
                info!("{} rules remain in the dry-run data plane", plane.num_installed());
                result?;
            } else {
                let plane = Arc::new(OvsConnection::new(config)?);
                run_session(&graph, &requests, plane, options, keep, stats, json)?;
            }
        }
        MainCommand::Clear { topology, config } => {
            let graph = load_topology(&topology)?;
            let conn = OvsConnection::new(load_config(config)?)?;
            let mut failed = 0;
            for switch in graph.switches() {
                let name = graph.node_name(switch)?;
                if let Err(e) = conn.clear_tagged(name) {
                    error!("{}", e);
                    failed += 1;
                }
            }
            if failed > 0 {
                return Err(format!("{} switches could not be cleared", failed).into());
            }
        }
    }

    Ok(())
}

/// Create one path per request, report the paths (and optionally their counters), and tear them
/// down again unless `keep` is set. Failing requests are logged and skipped.
fn run_session<C: ControlPlane + 'static>(
    graph: &TopologyGraph,
    requests: &[PathRequest],
    plane: Arc<C>,
    options: SessionOptions,
    keep: bool,
    stats: bool,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut manager = SessionManager::with_options(plane, options);
    let mut failed = 0;

    for request in requests.iter() {
        match manager.create_path_from_request(graph, request) {
            Ok(active) => {
                info!("{} ({}): {}", active.id, active.algorithm, active.names.join(" -> "))
            }
            Err(e) => {
                error!("Request {} -> {} failed: {}", request.source, request.destination, e);
                failed += 1;
            }
        }
    }

    let summaries = manager.summaries();
    let mut path_stats = Vec::new();
    let mut flow_stats = Vec::new();
    if stats {
        for summary in summaries.iter() {
            path_stats.push(manager.stats_for(summary.path_id)?);
            match manager.flow_stats_for(summary.path_id) {
                Ok(s) => flow_stats.extend(s),
                Err(e) => warn!("No flow statistics for {}: {}", summary.path_id, e),
            }
        }
    }

    if json {
        let report = serde_json::json!({
            "paths": summaries,
            "stats": path_stats,
            "flows": flow_stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for summary in summaries.iter() {
            let sequence = summary.sequence.join(" -> ");
            println!("{} [{}]: {}", summary.path_id, summary.algorithm, sequence);
            for rule in summary.installed_rule_ids.iter() {
                println!("    {}", rule);
            }
        }
        for s in path_stats.iter() {
            println!("{:?}", s);
        }
        for s in flow_stats.iter() {
            println!("{}: {} packets, {} bytes", s.rule, s.n_packets, s.n_bytes);
        }
    }

    if !keep {
        manager.teardown_all()?;
    }

    if failed > 0 {
        return Err(format!("{} of {} requests failed", failed, requests.len()).into());
    }
    Ok(())
}

fn load_topology(filename: &Path) -> Result<TopologyGraph, Box<dyn Error>> {
    Ok(TopologyDescription::from_file(filename)?.build()?)
}

fn load_config(filename: Option<PathBuf>) -> Result<RuntimeConfig, Box<dyn Error>> {
    Ok(match filename {
        Some(f) => RuntimeConfig::from_file(f)?,
        None => RuntimeConfig::default(),
    })
}

#[derive(Parser, Debug)]
#[clap(name = "ofpath", about = "Plan paths and install them as OpenFlow rules")]
struct CommandLineArguments {
    /// Action to perform
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Plan a single path and print the compiled rules, without touching the data plane
    #[clap(name = "plan")]
    Plan {
        /// Topology description (JSON)
        #[clap(short = 't', long)]
        topology: PathBuf,
        /// Source host
        #[clap(short = 's', long)]
        source: String,
        /// Destination host
        #[clap(short = 'd', long)]
        destination: String,
        /// Algorithm: manual, dijkstra, bfs or dfs
        #[clap(short = 'a', long, default_value = "dijkstra")]
        algorithm: AlgorithmKind,
        /// Comma separated node sequence for the manual algorithm
        #[clap(short = 'p', long)]
        sequence: Option<String>,
        /// Print the topology, including the port mapping, as JSON
        #[clap(long)]
        dump: bool,
    },
    /// Create the paths of a request file, report them, and tear them down again
    #[clap(name = "run")]
    Run {
        /// Topology description (JSON)
        #[clap(short = 't', long)]
        topology: PathBuf,
        /// List of path requests (JSON)
        #[clap(short = 'r', long)]
        requests: PathBuf,
        /// Runtime configuration (JSON)
        #[clap(short = 'c', long)]
        config: Option<PathBuf>,
        /// Number of rules installed in parallel. Defaults to the number of CPUs.
        #[clap(short = 'n', long)]
        threads: Option<usize>,
        /// Use an in-memory data plane instead of Open vSwitch
        #[clap(long)]
        dry_run: bool,
        /// Keep the rules installed when done
        #[clap(short = 'k', long)]
        keep: bool,
        /// Read the endpoint counters and flow statistics of every path
        #[clap(long)]
        stats: bool,
        /// Print the report as JSON
        #[clap(long = "json")]
        json: bool,
    },
    /// Remove all path rules from every switch of the topology
    #[clap(name = "clear")]
    Clear {
        /// Topology description (JSON)
        #[clap(short = 't', long)]
        topology: PathBuf,
        /// Runtime configuration (JSON)
        #[clap(short = 'c', long)]
        config: Option<PathBuf>,
    },
}
