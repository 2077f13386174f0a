pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_sequences.sql" => out.push_str(include_str!("../../../sql/00_sequences.sql")),
				"tables/001_disclosures.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_disclosures.sql")),
				"tables/002_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_events.sql")),
				"tables/003_dispatch_jobs.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_dispatch_jobs.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
