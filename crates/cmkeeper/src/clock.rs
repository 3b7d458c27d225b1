use std::time::{SystemTime, UNIX_EPOCH};

/// Renders a wall-clock instant as `YYYY-MM-DD HH:MM:SS.mmm` (UTC).
pub fn format_timestamp(at: SystemTime) -> String {
	let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
	let (year, month, day, hour, minute, second) = secs_to_datetime(since_epoch.as_secs());
	format!(
		"{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
		year,
		month,
		day,
		hour,
		minute,
		second,
		since_epoch.subsec_millis()
	)
}

pub fn now() -> String {
	format_timestamp(SystemTime::now())
}

pub fn secs_to_datetime(secs: u64) -> (u32, u32, u32, u32, u32, u32) {
	let days = (secs / 86400) as i64;
	let time_of_day = secs % 86400;
	let hour = (time_of_day / 3600) as u32;
	let minute = ((time_of_day % 3600) / 60) as u32;
	let second = (time_of_day % 60) as u32;

	// civil-from-days, proleptic Gregorian
	let z = days + 719468;
	let era = if z >= 0 { z } else { z - 146096 } / 146097;
	let doe = (z - era * 146097) as u32;
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let d = doy - (153 * mp + 2) / 5 + 1;
	let m = if mp < 10 { mp + 3 } else { mp - 9 };
	let y = if m <= 2 { y + 1 } else { y };

	(y as u32, m, d, hour, minute, second)
}
