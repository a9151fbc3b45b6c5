//! SQL statement construction.
//!
//! Values never appear in generated SQL: callers bind them as named
//! parameters. Condition, order, join and update fragments are raw SQL
//! supplied by the caller and are passed through verbatim.

/// Quote an identifier with backticks, part by part (`a.b` → `` `a`.`b` ``).
/// `*` is left unquoted.
pub fn quote_field(name: &str) -> String {
    name.split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                format!("`{}`", part)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote every identifier in `fields`.
pub fn quote_fields<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
    fields.iter().map(|f| quote_field(f.as_ref())).collect()
}

/// Selected columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fields {
    #[default]
    All,
    /// Raw SQL select list, used verbatim.
    Raw(String),
    /// Column names, quoted when rendered.
    List(Vec<String>),
}

impl Fields {
    fn render(&self) -> String {
        match self {
            Fields::All => "*".to_string(),
            Fields::Raw(raw) => raw.clone(),
            Fields::List(list) => quote_fields(list).join(", "),
        }
    }
}

/// Parts of a SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    pub fields: Fields,
    pub conditions: Option<String>,
    pub joins: Option<String>,
    pub group: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    /// Count expression used by pagination instead of `*`.
    pub count: Option<String>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Fields::List(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn raw_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Fields::Raw(fields.into());
        self
    }

    pub fn conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: impl ToString) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    pub fn count(mut self, expression: impl Into<String>) -> Self {
        self.count = Some(expression.into());
        self
    }
}

fn non_empty(part: &Option<String>) -> Option<&str> {
    part.as_deref().map(str::trim).filter(|p| !p.is_empty())
}

/// `SELECT <fields> FROM <table> <joins> WHERE <conditions> [GROUP BY] [ORDER BY] [LIMIT]`.
pub fn build_select(table: &str, select: &Select) -> String {
    let mut sql = format!("SELECT {} FROM {}", select.fields.render(), quote_field(table));
    if let Some(joins) = non_empty(&select.joins) {
        sql.push(' ');
        sql.push_str(joins);
    }
    sql.push_str(" WHERE ");
    sql.push_str(non_empty(&select.conditions).unwrap_or("1"));
    if let Some(group) = non_empty(&select.group) {
        sql.push_str(" GROUP BY ");
        sql.push_str(group);
    }
    if let Some(order) = non_empty(&select.order) {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(limit) = non_empty(&select.limit) {
        sql.push_str(" LIMIT ");
        sql.push_str(limit);
    }
    sql
}

/// `` `k1` = :k1 AND `k2` = :k2 `` for the given key columns.
pub fn key_conditions<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|k| format!("{} = :{}", quote_field(k.as_ref()), k.as_ref()))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn values_statement(verb: &str, table: &str, fields: &[String]) -> String {
    let placeholders: Vec<String> = fields.iter().map(|f| format!(":{}", f)).collect();
    format!(
        "{} INTO {} ({}) VALUES ({})",
        verb,
        quote_field(table),
        quote_fields(fields).join(", "),
        placeholders.join(", ")
    )
}

pub fn insert(table: &str, fields: &[String]) -> String {
    values_statement("INSERT", table, fields)
}

pub fn replace(table: &str, fields: &[String]) -> String {
    values_statement("REPLACE", table, fields)
}

/// UPDATE of `fields` scoped by primary key. Key columns are not assigned.
pub fn update(table: &str, fields: &[String], primary_key: &[String]) -> String {
    let updates: Vec<String> = fields
        .iter()
        .filter(|f| !primary_key.contains(f))
        .map(|f| format!("{} = :{}", quote_field(f), f))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_field(table),
        updates.join(", "),
        key_conditions(primary_key)
    )
}

pub fn update_field(table: &str, field: &str, primary_key: &[String]) -> String {
    format!(
        "UPDATE {} SET {} = :{} WHERE {}",
        quote_field(table),
        quote_field(field),
        field,
        key_conditions(primary_key)
    )
}

pub fn delete(table: &str, primary_key: &[String]) -> String {
    format!("DELETE FROM {} WHERE {}", quote_field(table), key_conditions(primary_key))
}

pub fn update_all(table: &str, updates: &str, conditions: &str) -> String {
    let conditions = if conditions.trim().is_empty() { "1" } else { conditions };
    format!("UPDATE {} SET {} WHERE {}", quote_field(table), updates, conditions)
}

pub fn delete_all(table: &str, conditions: &str) -> String {
    format!("DELETE FROM {} WHERE {}", quote_field(table), conditions)
}

/// SQLite has no TRUNCATE; an unconditional DELETE empties the table.
pub fn truncate(table: &str) -> String {
    format!("DELETE FROM {}", quote_field(table))
}

/// Turn a finder expression such as `EmailOrUsername` into a condition
/// fragment and the ordered parameter names it binds.
///
/// Field names are separated by `And`, `Or` or `Not`.
pub fn parse_finder(expr: &str) -> (String, Vec<String>) {
    let underscored = crate::inflect::underscore(expr);
    let mut rest = underscored.as_str();
    let mut conditions = String::new();
    let mut keys: Vec<String> = Vec::new();

    loop {
        let next = ["_and_", "_or_", "_not_"]
            .iter()
            .filter_map(|sep| rest.find(sep).map(|at| (at, *sep)))
            .min_by_key(|(at, _)| *at);

        let (field, operator) = match next {
            Some((at, sep)) => (&rest[..at], Some(sep)),
            None => (rest, None),
        };
        conditions.push_str(&format!("{} = :{}", quote_field(field), field));
        if !keys.iter().any(|k| k == field) {
            keys.push(field.to_string());
        }

        match operator {
            Some(sep) => {
                conditions.push_str(match sep {
                    "_and_" => " AND ",
                    "_or_" => " OR ",
                    _ => " AND NOT ",
                });
                rest = &rest[field.len() + sep.len()..];
            }
            None => break,
        }
    }
    (conditions, keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("title"), "`title`");
        assert_eq!(quote_field("posts.title"), "`posts`.`title`");
        assert_eq!(quote_field("posts.*"), "`posts`.*");
    }

    #[test]
    fn test_build_select_defaults() {
        assert_eq!(build_select("posts", &Select::new()), "SELECT * FROM `posts` WHERE 1");
        assert_eq!(
            build_select("posts", &Select::new().conditions("   ")),
            "SELECT * FROM `posts` WHERE 1"
        );
    }

    #[test]
    fn test_build_select_all_parts() {
        let select = Select::new()
            .fields(["id", "title"])
            .joins("LEFT JOIN `users` ON (`users`.`id` = `posts`.`user_id`)")
            .conditions("`posts`.`id` > :min")
            .group("user_id")
            .order("id DESC")
            .limit("0, 10");
        assert_eq!(
            build_select("posts", &select),
            "SELECT `id`, `title` FROM `posts` LEFT JOIN `users` ON (`users`.`id` = `posts`.`user_id`) \
             WHERE `posts`.`id` > :min GROUP BY user_id ORDER BY id DESC LIMIT 0, 10"
        );
    }

    #[test]
    fn test_write_statements() {
        let fields = vec!["id".to_string(), "title".to_string()];
        let pk = vec!["id".to_string()];
        assert_eq!(
            insert("posts", &fields),
            "INSERT INTO `posts` (`id`, `title`) VALUES (:id, :title)"
        );
        assert_eq!(
            replace("posts", &fields),
            "REPLACE INTO `posts` (`id`, `title`) VALUES (:id, :title)"
        );
        assert_eq!(
            update("posts", &fields, &pk),
            "UPDATE `posts` SET `title` = :title WHERE `id` = :id"
        );
        assert_eq!(
            update_field("posts", "title", &pk),
            "UPDATE `posts` SET `title` = :title WHERE `id` = :id"
        );
        assert_eq!(delete("posts", &pk), "DELETE FROM `posts` WHERE `id` = :id");
        assert_eq!(
            update_all("posts", "views = views + 1", ""),
            "UPDATE `posts` SET views = views + 1 WHERE 1"
        );
        assert_eq!(truncate("posts"), "DELETE FROM `posts`");
    }

    #[test]
    fn test_composite_key_conditions() {
        let pk = vec!["post_id".to_string(), "tag_id".to_string()];
        assert_eq!(key_conditions(&pk), "`post_id` = :post_id AND `tag_id` = :tag_id");
    }

    #[test]
    fn test_parse_finder() {
        let (conditions, keys) = parse_finder("EmailOrUsername");
        assert_eq!(conditions, "`email` = :email OR `username` = :username");
        assert_eq!(keys, vec!["email", "username"]);

        let (conditions, keys) = parse_finder("CreatedAtAndStatus");
        assert_eq!(conditions, "`created_at` = :created_at AND `status` = :status");
        assert_eq!(keys, vec!["created_at", "status"]);

        let (conditions, keys) = parse_finder("Name");
        assert_eq!(conditions, "`name` = :name");
        assert_eq!(keys, vec!["name"]);
    }

    #[test]
    fn test_parse_finder_not_separator() {
        let (conditions, keys) = parse_finder("EmailNotUsername");
        assert_eq!(conditions, "`email` = :email AND NOT `username` = :username");
        assert_eq!(keys, vec!["email", "username"]);

        let (conditions, keys) = parse_finder("StatusAndNameNotStatus");
        assert_eq!(
            conditions,
            "`status` = :status AND `name` = :name AND NOT `status` = :status"
        );
        assert_eq!(keys, vec!["status", "name"]);
    }
}
