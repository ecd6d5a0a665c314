//! Statement text for entity load, insert and update.
//!
//! Identical inputs always produce identical text, so every entity type
//! hits the same cached statement on each call.

fn placeholders(names: &[&str], separator: &str) -> String {
    names
        .iter()
        .map(|name| format!("{} = ?", name))
        .collect::<Vec<_>>()
        .join(separator)
}

/// `SELECT * FROM <table> WHERE k1 = ? AND k2 = ?`
pub fn select_by_keys(table: &str, keys: &[&str]) -> String {
    format!("SELECT * FROM {} WHERE {}", table, placeholders(keys, " AND "))
}

/// `INSERT INTO <table> (a,b) VALUES (?,?)`
pub fn insert(table: &str, columns: &[&str]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        vec!["?"; columns.len()].join(",")
    )
}

/// `UPDATE <table> SET a = ?,b = ? WHERE k1 = ? AND k2 = ?`
pub fn update(table: &str, columns: &[&str], keys: &[&str]) -> String {
    format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        placeholders(columns, ","),
        placeholders(keys, " AND ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_keys() {
        insta::assert_snapshot!(select_by_keys("users", &["id"]), @"SELECT * FROM users WHERE id = ?");
        insta::assert_snapshot!(
            select_by_keys("post_categories", &["post_id", "category_id"]),
            @"SELECT * FROM post_categories WHERE post_id = ? AND category_id = ?"
        );
    }

    #[test]
    fn test_insert() {
        insta::assert_snapshot!(insert("users", &["name", "email"]), @"INSERT INTO users (name,email) VALUES (?,?)");
        insta::assert_snapshot!(insert("tags", &["label"]), @"INSERT INTO tags (label) VALUES (?)");
    }

    #[test]
    fn test_update() {
        insta::assert_snapshot!(
            update("users", &["name", "email"], &["id"]),
            @"UPDATE users SET name = ?,email = ? WHERE id = ?"
        );
        insta::assert_snapshot!(
            update("post_categories", &["position"], &["post_id", "category_id"]),
            @"UPDATE post_categories SET position = ? WHERE post_id = ? AND category_id = ?"
        );
    }
}
