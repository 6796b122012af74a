//! Simple move example: load a scenario, route each of its moves in the
//! background worker and print what would change.

use std::path::Path;
use std::sync::Arc;
use wireroute::prelude::*;
use wireroute::Scenario;

fn main() -> Result<(), RouteError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/simple.json".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example simple_move [path/to/scenario.json]");
        std::process::exit(1);
    }

    let loaded = Scenario::from_path(path)?.build()?;
    let worker = ConnectorWorker::new(loaded.config.clone())?;
    let gesture = MoveGesture::new(&worker, Arc::new(loaded.circuit), loaded.selection);

    println!("Connections: {}", gesture.connections().len());
    for m in &loaded.moves {
        let result = gesture.force_request(m.dx, m.dy)?;
        println!();
        println!("Move ({}, {}): cost {}", m.dx, m.dy, result.total_cost());
        for wire in result.replacements().wires_to_remove() {
            println!("  - {}", wire);
        }
        for wire in result.replacements().wires_to_add() {
            println!("  + {}", wire);
        }
        for point in result.unconnected_destinations() {
            println!("  unconnected at {}", point);
        }
    }

    Ok(())
}
