pub fn render_schema() -> &'static str {
	include_str!("../../../sql/documents.sql")
}

pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_splits_into_statements() {
		let statements: Vec<&str> = statements(render_schema()).collect();

		assert_eq!(statements.len(), 3);
		assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS documents"));
		assert!(statements.iter().all(|statement| statement.starts_with("CREATE")));
	}
}
