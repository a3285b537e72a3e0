//! Decision log repository: append and query the `decision_log` table.

use keel_core::{EventQuery, EventRow};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};

use super::{format_ts, parse_ts};
use crate::errors::Result;

/// Decision log repository: stateless, every method takes `&Connection`.
pub struct DecisionLogRepo;

type RawRow = (String, String, String, Option<String>, String, String);

fn decode_row(raw: RawRow) -> Result<EventRow> {
    let (id, decision_type, event_type, entity_id, payload, created_at) = raw;
    Ok(EventRow {
        id,
        decision_type,
        event_type,
        entity_id,
        payload: serde_json::from_str(&payload)?,
        created_at: parse_ts(&created_at)?,
    })
}

impl DecisionLogRepo {
    /// Append one row.
    pub fn insert(conn: &Connection, row: &EventRow) -> Result<()> {
        let payload = serde_json::to_string(&row.payload)?;
        let _ = conn.execute(
            "INSERT INTO decision_log
                 (id, decision_type, event_type, entity_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.decision_type,
                row.event_type,
                row.entity_id,
                payload,
                format_ts(row.created_at)
            ],
        )?;
        Ok(())
    }

    /// Append several rows in one transaction. Nothing is written on failure.
    pub fn insert_many(conn: &Connection, rows: &[EventRow]) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        for row in rows {
            Self::insert(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Query with equality, inclusive range and limit, newest first.
    pub fn query(conn: &Connection, query: &EventQuery) -> Result<Vec<EventRow>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(decision_type) = &query.decision_type {
            clauses.push("decision_type = ?");
            args.push(SqlValue::Text(decision_type.clone()));
        }
        if let Some(event_type) = &query.event_type {
            clauses.push("event_type = ?");
            args.push(SqlValue::Text(event_type.clone()));
        }
        if let Some(entity_id) = &query.entity_id {
            clauses.push("entity_id = ?");
            args.push(SqlValue::Text(entity_id.clone()));
        }
        if let Some(since) = query.since {
            clauses.push("created_at >= ?");
            args.push(SqlValue::Text(format_ts(since)));
        }
        if let Some(until) = query.until {
            clauses.push("created_at <= ?");
            args.push(SqlValue::Text(format_ts(until)));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        args.push(SqlValue::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT id, decision_type, event_type, entity_id, payload, created_at
             FROM decision_log {where_sql}
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?"
        );

        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter().map(decode_row).collect()
    }

    /// Total rows in the log.
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM decision_log", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn row(id: &str, decision: &str, entity: Option<&str>, at: DateTime<Utc>) -> EventRow {
        EventRow {
            id: id.into(),
            decision_type: decision.into(),
            event_type: "route".into(),
            entity_id: entity.map(str::to_string),
            payload: json!({"id": id}),
            created_at: at,
        }
    }

    fn ids(rows: &[EventRow]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn query_orders_newest_first() {
        let conn = setup();
        let now = Utc::now();
        let a = row("a", "routing_decision", None, now - Duration::minutes(2));
        let b = row("b", "routing_decision", None, now);
        let c = row("c", "routing_decision", None, now - Duration::minutes(1));
        for r in [&a, &b, &c] {
            DecisionLogRepo::insert(&conn, r).unwrap();
        }

        let query = EventQuery {
            limit: 10,
            ..Default::default()
        };
        let rows = DecisionLogRepo::query(&conn, &query).unwrap();
        assert_eq!(ids(&rows), ["b", "c", "a"]);
        assert_eq!(rows[0].payload, json!({"id": "b"}));
    }

    #[test]
    fn query_applies_filters_and_limit() {
        let conn = setup();
        let now = Utc::now();
        DecisionLogRepo::insert_many(
            &conn,
            &[
                row("a", "routing_decision", Some("v-1"), now - Duration::minutes(3)),
                row("b", "escalation", Some("v-1"), now - Duration::minutes(2)),
                row("c", "routing_decision", Some("v-2"), now - Duration::minutes(1)),
                row("d", "routing_decision", Some("v-1"), now),
            ],
        )
        .unwrap();

        let by_type = DecisionLogRepo::query(
            &conn,
            &EventQuery {
                decision_type: Some("routing_decision".into()),
                entity_id: Some("v-1".into()),
                limit: 10,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ids(&by_type), ["d", "a"]);

        let query = EventQuery {
            limit: 2,
            ..Default::default()
        };
        let limited = DecisionLogRepo::query(&conn, &query).unwrap();
        assert_eq!(ids(&limited), ["d", "c"]);
    }

    #[test]
    fn query_range_is_inclusive() {
        let conn = setup();
        let now = Utc::now();
        let start = now - Duration::minutes(2);
        let end = now - Duration::minutes(1);
        DecisionLogRepo::insert_many(
            &conn,
            &[
                row("before", "x", None, start - Duration::seconds(1)),
                row("start", "x", None, start),
                row("end", "x", None, end),
                row("after", "x", None, now),
            ],
        )
        .unwrap();

        let rows = DecisionLogRepo::query(
            &conn,
            &EventQuery {
                since: Some(start),
                until: Some(end),
                limit: 10,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ids(&rows), ["end", "start"]);
    }

    #[test]
    fn insert_many_is_all_or_nothing() {
        let conn = setup();
        let now = Utc::now();
        DecisionLogRepo::insert(&conn, &row("dup", "x", None, now)).unwrap();

        let result = DecisionLogRepo::insert_many(
            &conn,
            &[row("fresh", "x", None, now), row("dup", "x", None, now)],
        );
        assert!(result.is_err());
        assert_eq!(DecisionLogRepo::count(&conn).unwrap(), 1);
    }
}
