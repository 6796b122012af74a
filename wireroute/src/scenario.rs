//! JSON scenario files: a small circuit, a selection and the moves to try.
//!
//! ```json
//! {
//!   "parts": [{ "name": "U1", "bounds": { "x": 100, "y": 90, "width": 30, "height": 20 },
//!               "pins": [{ "x": 100, "y": 100 }] }],
//!   "wires": [{ "from": { "x": 50, "y": 100 }, "to": { "x": 100, "y": 100 } }],
//!   "selection": ["U1"],
//!   "moves": [{ "dx": 20, "dy": 0 }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::circuit::{Circuit, ElementId, Part, Selection, Wire};
use crate::core::{RouteError, RouterConfig};
use crate::geom::{Bounds, GridPoint, PITCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
    pub name: String,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Exact outline; the bounds are derived from it when present
    #[serde(default)]
    pub polygon: Option<Vec<GridPoint>>,
    #[serde(default)]
    pub pins: Vec<GridPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSpec {
    /// Needed only to select the wire
    #[serde(default)]
    pub name: Option<String>,
    pub from: GridPoint,
    pub to: GridPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSpec {
    pub dx: i32,
    pub dy: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parts: Vec<PartSpec>,
    #[serde(default)]
    pub wires: Vec<WireSpec>,
    pub selection: Vec<String>,
    #[serde(default)]
    pub moves: Vec<MoveSpec>,
    #[serde(default)]
    pub config: Option<RouterConfig>,
}

/// A scenario turned into engine types
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub circuit: Circuit,
    pub selection: Selection,
    pub names: BTreeMap<String, ElementId>,
    pub moves: Vec<MoveSpec>,
    pub config: RouterConfig,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> Result<Self, RouteError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, RouteError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Build the circuit and selection, checking names and geometry.
    pub fn build(&self) -> Result<LoadedScenario, RouteError> {
        let mut circuit = Circuit::new();
        let mut names = BTreeMap::new();

        for spec in &self.parts {
            for pin in &spec.pins {
                check_on_grid(*pin, &spec.name)?;
            }
            let part = match (&spec.polygon, spec.bounds) {
                (Some(vertices), _) if vertices.len() < 3 => {
                    return Err(RouteError::Scenario(format!(
                        "part '{}' has a polygon with fewer than 3 vertices",
                        spec.name
                    )))
                }
                (Some(vertices), _) => Part::polygon(&spec.name, vertices.clone(), spec.pins.clone()),
                (None, Some(bounds)) => Part::rect(&spec.name, bounds, spec.pins.clone()),
                (None, None) => {
                    return Err(RouteError::Scenario(format!(
                        "part '{}' needs bounds or a polygon",
                        spec.name
                    )))
                }
            };
            let id = circuit.add_part(part);
            register(&mut names, &spec.name, id)?;
        }

        for (i, spec) in self.wires.iter().enumerate() {
            let label = spec.name.clone().unwrap_or_else(|| format!("wire #{}", i));
            check_on_grid(spec.from, &label)?;
            check_on_grid(spec.to, &label)?;
            let id = circuit.add_wire(Wire::try_new(spec.from, spec.to)?);
            if let Some(name) = &spec.name {
                register(&mut names, name, id)?;
            }
        }

        let mut selection = Selection::new();
        for name in &self.selection {
            let id = names
                .get(name)
                .ok_or_else(|| RouteError::UnknownElement(name.clone()))?;
            selection.insert(*id);
        }

        Ok(LoadedScenario {
            circuit,
            selection,
            names,
            moves: self.moves.clone(),
            config: self.config.clone().unwrap_or_default(),
        })
    }
}

fn register(names: &mut BTreeMap<String, ElementId>, name: &str, id: ElementId) -> Result<(), RouteError> {
    if names.insert(name.to_owned(), id).is_some() {
        return Err(RouteError::Scenario(format!("duplicate element name '{}'", name)));
    }
    Ok(())
}

fn check_on_grid(p: GridPoint, owner: &str) -> Result<(), RouteError> {
    if !p.is_on_canvas() || p.x % PITCH != 0 || p.y % PITCH != 0 {
        return Err(RouteError::Scenario(format!(
            "{} of '{}' is not a grid point",
            p, owner
        )));
    }
    Ok(())
}
