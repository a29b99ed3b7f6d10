use incident_sim::parallel::{BatchRunner, simple_progress_reporter};
use incident_sim::{
    Calibration, Gravity, IncidentSimulation, IncidentType, SimulationConfig, SimulationInputs,
};
use std::sync::Arc;

fn main() -> incident_sim::Result<()> {
    env_logger::init();

    println!("========================================");
    println!("Urban Incident Simulation");
    println!("========================================");

    // Optional TOML config as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::baseline(),
    };
    let calibration = Arc::new(Calibration::baseline());
    let inputs = Arc::new(SimulationInputs::numbered(100, Arc::clone(&calibration)));

    println!(
        "\nRun {}: {} days over {} microzones, starting on day {} of the year",
        config.run_id(),
        config.num_days,
        inputs.microzones.len(),
        config.start_day_of_year
    );

    let mut sim = IncidentSimulation::new(config.clone(), Arc::clone(&inputs))?;
    let stats = sim.run_to_end();

    println!("\n{:<12} {:>10} {:>10} {:>10} {:>12}", "Type", "Benign", "Moderate", "Severe", "Mean/day");
    println!("{:-<12} {:->10} {:->10} {:->10} {:->12}", "", "", "", "", "");
    for t in IncidentType::ALL {
        let totals = stats.totals.get(t);
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>12.4}",
            t.to_string(),
            totals.benign,
            totals.moderate,
            totals.severe,
            stats.mean_daily_rate(t)
        );
    }

    println!(
        "\nAll-zero zone-days: {:.3} (target {:.2})",
        stats.all_zero_frequency,
        calibration.target_zero_probability()
    );
    println!("Active patterns:    {}", stats.active_patterns);
    println!(
        "Regime occupancy:   stable {} / deteriorating {} / crisis {}",
        stats.regime_occupancy[0], stats.regime_occupancy[1], stats.regime_occupancy[2]
    );
    println!("Casualty score:     {:.1}", stats.casualty_score);

    // Calibration check across seeds
    println!("\n========================================");
    println!("Calibration runs (300 days, 10 microzones)");
    println!("========================================\n");

    let seeds = vec![42, 123, 456, 789, 1024];
    let calibration_inputs = Arc::new(SimulationInputs::numbered(10, Arc::clone(&calibration)));
    let results = BatchRunner::new(
        SimulationConfig::calibration(300, 0),
        calibration_inputs,
        seeds.clone(),
    )
    .progress(simple_progress_reporter(1))
    .run();

    println!(
        "{:<8} {:>10} {:>14} {:>14}",
        "Seed", "All-zero", "1 agr benign", "1 acc moderate"
    );
    println!("{:-<8} {:->10} {:->14} {:->14}", "", "", "", "");
    for (seed, result) in seeds.iter().zip(&results) {
        match result {
            Ok(stats) => println!(
                "{:<8} {:>10.3} {:>14.4} {:>14.4}",
                seed,
                stats.all_zero_frequency,
                stats.exactly_one_frequency.aggression[Gravity::Benign.index()],
                stats.exactly_one_frequency.accident[Gravity::Moderate.index()]
            ),
            Err(e) => eprintln!("{:<8} failed: {}", seed, e),
        }
    }
    println!(
        "{:<8} {:>10.3} {:>14.4} {:>14.4}",
        "target",
        calibration.target_zero_probability(),
        calibration.target_exactly_one(IncidentType::Aggression, Gravity::Benign),
        calibration.target_exactly_one(IncidentType::Accident, Gravity::Moderate)
    );

    Ok(())
}
