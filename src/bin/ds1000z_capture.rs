
use std::env;
use std::error::Error;

use log::info;

use ds1000z_capture::{CancelToken, CaptureConfig, Ds1000z};

// Usage: ds1000z_capture <config.json>
//        ds1000z_capture --host <addr>
fn load_config() -> Result<CaptureConfig, Box<dyn Error>> {
	let args:Vec<String> = env::args().skip(1).collect();
	match args.as_slice() {
		[flag, host] if flag == "--host" => {
			let config = CaptureConfig{ host: host.clone(), ..CaptureConfig::default() };
			config.validate()?;
			Ok(config)
		},
		[path] => Ok(CaptureConfig::from_json_file(path)?),
		_ => Err("usage: ds1000z_capture <config.json> | --host <addr>".into()),
	}
}

fn main() -> Result<(), Box<dyn Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let config = load_config()?;
	let mut scope = Ds1000z::connect(config)?;

	let capture = scope.capture(&CancelToken::new())?;
	let series = &capture.series;

	let (v_min, v_max) = series.voltage.iter()
		.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
	info!("CHAN{}: {} points over {:.3} {}, {:.3} V to {:.3} V ({} V/div, offset {} V)",
		capture.channel, series.len(), series.time.last().copied().unwrap_or(0.0), series.time_unit.label(),
		v_min, v_max, capture.volts_per_div, capture.volt_offset);

	// Presentation lives elsewhere; hand the capture over as JSON on stdout
	let stdout = std::io::stdout();
	serde_json::to_writer(stdout.lock(), &capture)?;
	Ok(())
}
