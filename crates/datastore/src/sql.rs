use itertools::Itertools;

// Runs every time a `MySqlSink` is initialized, so it needs to be
// idempotent and must not touch already-resident data.
pub const INIT_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS pageview_logs (
        id BIGINT NOT NULL AUTO_INCREMENT,
        name VARCHAR(64) NOT NULL,
        page VARCHAR(255) NOT NULL,
        views BIGINT NOT NULL,
        rid VARCHAR(64),
        viewed_at BIGINT NOT NULL,

        PRIMARY KEY (id),
        INDEX pageview_logs_by_name_time (name, viewed_at)
    );
"#;

/// `(insert prefix, row arity)` for each table the sink knows how to write.
pub fn insert_format(table: &str) -> Option<(&'static str, usize)> {
    match table {
        "pageview_logs" => Some((
            "INSERT INTO pageview_logs (name, page, views, rid, viewed_at) VALUES ",
            5,
        )),
        _ => None,
    }
}

/// Extend an insert prefix with `num_rows` positional placeholder tuples.
pub fn build_insert_statement(prefix: &str, arity: usize, num_rows: usize) -> String {
    let group = format!("({})", std::iter::repeat("?").take(arity).join(", "));
    format!(
        "{}{}",
        prefix,
        std::iter::repeat(group.as_str()).take(num_rows).join(", ")
    )
}
