use super::config::SystemConfig;
use super::error::EngineError;
use crate::core::forcefield::params::ForceField;
use crate::core::handlers::{ForceContext, ParameterHandler};
use crate::core::matching::EnvironmentMatcher;
use crate::core::models::system::System;
use crate::core::models::topology::Topology;
use std::collections::VecDeque;
use tracing::{debug, info, instrument, warn};

/// Builds a new system holding the forces of every plugin handler.
#[instrument(skip_all, name = "create_system")]
pub fn create_system(
    force_field: &ForceField,
    topology: &Topology,
    matcher: &dyn EnvironmentMatcher,
    config: &SystemConfig,
) -> Result<System, EngineError> {
    let mut system = System::new(topology.atom_count());
    add_plugin_forces(force_field, topology, matcher, config, &mut system)?;
    Ok(system)
}

/// Appends plugin forces to a system the host has already started.
///
/// Handlers run in dependency order. A handler that fails leaves the forces
/// of the handlers before it in place and aborts the rest.
#[instrument(skip_all, name = "plugin_forces", fields(atoms = topology.atom_count(), periodic = config.periodic))]
pub fn add_plugin_forces(
    force_field: &ForceField,
    topology: &Topology,
    matcher: &dyn EnvironmentMatcher,
    config: &SystemConfig,
    system: &mut System,
) -> Result<(), EngineError> {
    if system.particle_count() != topology.atom_count() {
        return Err(EngineError::ParticleCountMismatch {
            topology: topology.atom_count(),
            system: system.particle_count(),
        });
    }

    let handlers = resolve_order(force_field)?;
    if handlers.is_empty() {
        warn!("Force field contains no plugin handlers; no forces were added.");
        return Ok(());
    }

    let context = ForceContext {
        topology,
        matcher,
        periodic: config.periodic,
        use_switching_function: config.use_switching_function,
        long_range_correction: config.long_range_correction,
    };

    info!(
        handlers = handlers.len(),
        atoms = topology.atom_count(),
        periodic = config.periodic,
        "Creating plugin forces"
    );
    for handler in handlers {
        let before = system.forces().len();
        handler
            .create_forces(&context, system)
            .map_err(|source| EngineError::Handler {
                tag: handler.tag_name().to_string(),
                source,
            })?;
        debug!(
            tag = handler.tag_name(),
            forces = system.forces().len() - before,
            "Handler forces created"
        );
    }
    Ok(())
}

/// Orders plugin handlers so that each runs after the plugins it depends on.
///
/// Dependencies on host sections are satisfied by the host before the plugins
/// run and only constrain plugin-to-plugin order. Among independent handlers
/// the document order is kept.
pub fn resolve_order(force_field: &ForceField) -> Result<Vec<&dyn ParameterHandler>, EngineError> {
    let handlers: Vec<&dyn ParameterHandler> = force_field.handlers().collect();
    let index_of = |tag: &str| handlers.iter().position(|h| h.tag_name() == tag);

    let mut in_degree = vec![0usize; handlers.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); handlers.len()];
    for (index, handler) in handlers.iter().enumerate() {
        for &dependency in handler.dependencies() {
            match index_of(dependency) {
                Some(provider) => {
                    dependents[provider].push(index);
                    in_degree[index] += 1;
                }
                None if force_field.has_section(dependency) => {}
                None => debug!(
                    tag = handler.tag_name(),
                    dependency, "Dependency not present in force field"
                ),
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..handlers.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(handlers.len());
    while let Some(index) = ready.pop_front() {
        order.push(handlers[index]);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() != handlers.len() {
        let stuck = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(i, _)| handlers[i].tag_name().to_string())
            .collect();
        return Err(EngineError::DependencyCycle(stuck));
    }
    Ok(order)
}
