use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use cellshape_common::{SimulationConfig, Snapshot};
use cellshape_engine::{CellShapeSimulation, MaskSchedule, ParticleKind, ParticleStore};

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting cell shape engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Domains from the first mask ---
    let mut schedule = MaskSchedule::from_config(&config);
    let initial_mask = schedule.current_mask();
    let initial_domains: Vec<(u32, i32)> = config.domains.iter().map(|d| (d.id, d.growth_rate)).collect();

    let mut sim = CellShapeSimulation::new(config, ParticleStore::new(1024))?;
    for (id, growth_rate) in initial_domains {
        sim.add_domain(&initial_mask, id, growth_rate)
            .with_context(|| format!("Failed to create initial domain {}", id))?;
    }
    info!(
        "Initialized {} domains with {} particles.",
        sim.registry().len(),
        sim.current_particle_count()
    );
    debug!("Simulation Parameters: {:#?}", sim.params());

    let params = sim.params().clone();
    sim.equilibrate(params.equilibration_substeps);

    // --- Simulation Loop ---
    let total_steps = params.num_steps;
    let record_interval_steps = params.record_interval_steps.max(1);
    info!("Recording snapshot every {} steps.", record_interval_steps);
    info!("Starting simulation loop for {} steps...", total_steps);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    // --- Initial Snapshot (step = 0) ---
    sim.record_snapshot().context("Failed to record initial snapshot")?;

    for step in 1..=total_steps {
        let step_start_time = Instant::now();

        let scheduled = schedule.advance(step);
        if !scheduled.divisions.is_empty() {
            sim.divide_cells(&scheduled.grid, &scheduled.divisions)
                .with_context(|| format!("Division failed at step {}", step))?;
        }
        sim.set_next_mask(scheduled.grid)?;

        let report = match sim.step() {
            Ok(report) => report,
            Err(e) => {
                error!("Error during simulation step {}: {}", step, e);
                anyhow::bail!("Simulation step failed.");
            }
        };
        for &id in &report.vanished {
            warn!("Removing vanished domain {}.", id);
            sim.remove_domain(id)?;
        }
        let step_duration = step_start_time.elapsed();

        // Print status periodically
        let current_time = Instant::now();
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_step = step % record_interval_steps == 0;
        let is_last_step = step == total_steps;

        if should_print_status || is_record_step || is_last_step {
            info!(
                "Step [{}/{}] | Domains: {} | Particles: {} | Changed arcs: {} | Displaced: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step,
                total_steps,
                sim.registry().len(),
                sim.current_particle_count(),
                report.changed_arcs,
                report.displaced,
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;

            // --- Record Snapshot ---
            if is_record_step || is_last_step {
                sim.record_snapshot()
                    .with_context(|| format!("Failed to record snapshot at step {}", step))?;
            }
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                step,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({} engine sub-steps).",
        total_duration.as_secs_f64(),
        sim.engine.substeps_taken()
    );

    // --- Save Recorded Data ---
    info!("Saving recorded data...");
    let base_filename = sim.config().output.base_filename.clone();
    if sim.config().output.save_stats {
        let output_format = sim.config().output.format.as_deref().unwrap_or("json");
        if let Err(e) = save_snapshots(sim.get_recorded_snapshots(), &base_filename, output_format) {
            error!("Error saving snapshots: {:#}", e);
        }
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    // Save final positions if requested (separate from full snapshots)
    if sim.config().output.save_positions {
        let filename = format!("{}_final_positions.csv", base_filename);
        match csv::Writer::from_path(&filename) {
            Ok(mut writer) => {
                writer.write_record(["domain_id", "kind", "x", "y"])?;
                for record in sim.particle_records()? {
                    let kind = match record.kind {
                        ParticleKind::Boundary => "boundary",
                        ParticleKind::Interior => "interior",
                    };
                    writer.write_record([
                        record.domain.to_string(),
                        kind.to_string(),
                        format!("{:.6}", record.x),
                        format!("{:.6}", record.y),
                    ])?;
                }
                writer.flush()?;
                info!("Final positions saved to {}", filename);
            }
            Err(e) => error!("Error saving CSV file '{}': {}", filename, e),
        }
    } else {
        info!("Skipping saving final positions as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Writes all snapshots in `format` ("json", "bincode" or "messagepack").
fn save_snapshots(snapshots: &Vec<Snapshot>, base_filename: &str, format: &str) -> Result<()> {
    let format = match format {
        "json" | "bincode" | "messagepack" => format,
        other => {
            error!("Unknown output format: {}. Using JSON instead.", other);
            "json"
        }
    };
    let extension = match format {
        "bincode" => "bin",
        "messagepack" => "msgpack",
        _ => "json",
    };
    let filename = format!("{}_snapshots.{}", base_filename, extension);
    let file = File::create(&filename).with_context(|| format!("Error creating snapshot file '{}'", filename))?;
    let mut writer = BufWriter::new(file);

    match format {
        "bincode" => bincode::serialize_into(&mut writer, snapshots)
            .context("Error serializing snapshots to bincode")?,
        "messagepack" => rmp_serde::encode::write(&mut writer, snapshots)
            .context("Error serializing snapshots to MessagePack")?,
        _ => serde_json::to_writer(&mut writer, snapshots).context("Error serializing snapshots to JSON")?,
    }
    writer.flush()?;
    info!("All {} snapshots saved to {} ({} format)", snapshots.len(), filename, format);
    Ok(())
}
