//! Catalog read queries: search, lookups and dashboard aggregates

use std::collections::HashMap;

use chrono::NaiveDate;
use miette::{IntoDiagnostic, Result};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{ActivityAction, ActivityItem, CatalogRow, CatalogStore, DashboardStats, SearchHits};
use crate::core::identity::ProjectStatus;

const PROJECT_COLUMNS: &str = "id, customer, name, tags_json, status, create_time, month, \
     project_dir, description, part_number, pinned, last_open_time, open_count";

impl CatalogStore {
    /// Search project ids.
    ///
    /// An empty query lists projects by pinned then recency. Otherwise the
    /// FTS5 shadow tables are ranked with bm25 (best rank per project across
    /// project, file and item-tag hits), or, without full text, a substring
    /// match over the same fields is ordered by pinned then recency only.
    pub fn search(&self, query: &str, limit: usize, include_archived: bool) -> Result<SearchHits> {
        let q = query.trim();
        let limit = limit as i64;
        let include = include_archived as i32;

        let ids: Vec<String> = if q.is_empty() {
            let mut stmt = self
                .conn
                .prepare(
                    r#"
                SELECT id
                FROM projects
                WHERE (?1 = 1) OR status != 'archived'
                ORDER BY
                    pinned DESC,
                    datetime(COALESCE(last_open_time, create_time)) DESC,
                    id DESC
                LIMIT ?2
                "#,
                )
                .into_diagnostic()?;
            let rows = stmt
                .query_map(params![include, limit], |row| row.get(0))
                .into_diagnostic()?;
            rows.filter_map(|r| r.ok()).collect()
        } else if self.full_text {
            let fts = fts_query(q);
            let mut stmt = self
                .conn
                .prepare(
                    r#"
                WITH hits AS (
                    SELECT id AS project_id, bm25(project_fts) AS score
                    FROM project_fts
                    WHERE project_fts MATCH ?1
                    UNION ALL
                    SELECT project_id, bm25(file_fts) AS score
                    FROM file_fts
                    WHERE file_fts MATCH ?1
                    UNION ALL
                    SELECT project_id, bm25(item_tag_fts) AS score
                    FROM item_tag_fts
                    WHERE item_tag_fts MATCH ?1
                ),
                best AS (
                    SELECT project_id, MIN(score) AS score
                    FROM hits
                    GROUP BY project_id
                )
                SELECT p.id
                FROM best
                JOIN projects p ON p.id = best.project_id
                WHERE (?2 = 1) OR p.status != 'archived'
                ORDER BY
                    p.pinned DESC,
                    best.score ASC,
                    datetime(COALESCE(p.last_open_time, p.create_time)) DESC
                LIMIT ?3
                "#,
                )
                .into_diagnostic()?;
            let rows = stmt
                .query_map(params![fts, include, limit], |row| row.get(0))
                .into_diagnostic()?;
            rows.filter_map(|r| r.ok()).collect()
        } else {
            let like = format!("%{}%", q);
            let mut stmt = self
                .conn
                .prepare(
                    r#"
                SELECT p.id
                FROM projects p
                LEFT JOIN files f ON f.project_id = p.id
                LEFT JOIN item_tags it ON it.project_id = p.id
                WHERE
                    ((?1 = 1) OR p.status != 'archived')
                    AND (
                        p.id LIKE ?2
                        OR p.customer LIKE ?2
                        OR p.name LIKE ?2
                        OR COALESCE(p.part_number, '') LIKE ?2
                        OR p.tags_json LIKE ?2
                        OR p.project_dir LIKE ?2
                        OR COALESCE(p.description, '') LIKE ?2
                        OR f.file_name LIKE ?2
                        OR f.rel_path LIKE ?2
                        OR it.tag LIKE ?2
                        OR it.rel_path LIKE ?2
                    )
                GROUP BY p.id
                ORDER BY
                    p.pinned DESC,
                    datetime(COALESCE(p.last_open_time, p.create_time)) DESC
                LIMIT ?3
                "#,
                )
                .into_diagnostic()?;
            let rows = stmt
                .query_map(params![include, like, limit], |row| row.get(0))
                .into_diagnostic()?;
            rows.filter_map(|r| r.ok()).collect()
        };

        Ok(SearchHits {
            ids,
            full_text: self.full_text,
        })
    }

    /// Fetch rows for ids, preserving the order of `ids` and skipping unknown ones
    pub fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT {} FROM projects WHERE id IN ({})",
            PROJECT_COLUMNS, placeholders
        );
        let mut stmt = self.conn.prepare(&sql).into_diagnostic()?;
        let mut by_id: HashMap<String, CatalogRow> = stmt
            .query_map(params_from_iter(ids.iter()), row_to_catalog)
            .into_diagnostic()?
            .filter_map(|r| r.ok())
            .map(|row| (row.id.clone(), row))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// One row by id
    pub fn get(&self, id: &str) -> Result<Option<CatalogRow>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
                params![id],
                row_to_catalog,
            )
            .optional()
            .into_diagnostic()
    }

    /// Number of catalogued projects
    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .into_diagnostic()
    }

    /// Counts by status plus projects created in the month of `today`
    pub fn dashboard_stats(&self, today: NaiveDate) -> Result<DashboardStats> {
        let month = today.format("%Y-%m").to_string();
        self.conn
            .query_row(
                r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status IN ('ongoing', 'processing') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status IN ('delivered', 'completed') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'archived' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN substr(create_time, 1, 7) = ?1 THEN 1 ELSE 0 END), 0)
            FROM projects
            "#,
                params![month],
                |row| {
                    Ok(DashboardStats {
                        total: row.get::<_, i64>(0)? as u64,
                        ongoing: row.get::<_, i64>(1)? as u64,
                        delivered: row.get::<_, i64>(2)? as u64,
                        archived: row.get::<_, i64>(3)? as u64,
                        new_this_month: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .into_diagnostic()
    }

    /// Most frequent project tags, ties broken alphabetically
    pub fn popular_tags(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tags_json FROM projects")
            .into_diagnostic()?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for tags_json in stmt
            .query_map([], |row| row.get::<_, String>(0))
            .into_diagnostic()?
            .filter_map(|r| r.ok())
        {
            let mut tags = parse_tags(&tags_json);
            tags.sort();
            tags.dedup();
            for tag in tags {
                *counts.entry(tag).or_default() += 1;
            }
        }

        let mut tags: Vec<(String, u64)> = counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tags.truncate(limit);
        Ok(tags)
    }

    /// Project count per month, newest month first
    pub fn month_counts(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT month, COUNT(*) FROM projects GROUP BY month ORDER BY month DESC")
            .into_diagnostic()?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .into_diagnostic()?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Projects ordered by last-open-or-create time
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityItem>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
            SELECT id, name, customer, status, last_open_time, create_time
            FROM projects
            ORDER BY datetime(COALESCE(last_open_time, create_time)) DESC, id DESC
            LIMIT ?1
            "#,
            )
            .into_diagnostic()?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let last_open: Option<String> = row.get(4)?;
                let created: String = row.get(5)?;
                let (action, time) = match last_open {
                    Some(t) => (ActivityAction::Opened, t),
                    None => (ActivityAction::Created, created),
                };
                Ok(ActivityItem {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    customer: row.get(2)?,
                    status: ProjectStatus::from_lenient(&row.get::<_, String>(3)?),
                    action,
                    time,
                })
            })
            .into_diagnostic()?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

/// Build an FTS5 MATCH expression: every term quoted as a prefix token, ANDed
pub(crate) fn fts_query(query: &str) -> String {
    let tokens: Vec<String> = query
        .replace(['\'', '"'], " ")
        .split_whitespace()
        .map(|t| format!("\"{}\"*", t))
        .collect();
    if tokens.is_empty() {
        "\"\"".to_string()
    } else {
        tokens.join(" AND ")
    }
}

fn parse_tags(tags_json: &str) -> Vec<String> {
    serde_json::from_str::<Vec<serde_json::Value>>(tags_json)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn row_to_catalog(row: &Row<'_>) -> rusqlite::Result<CatalogRow> {
    let tags_json: String = row.get(3)?;
    let status: String = row.get(4)?;
    let project_dir: String = row.get(7)?;
    let pinned: i64 = row.get(10)?;
    let open_count: i64 = row.get(12)?;
    Ok(CatalogRow {
        id: row.get(0)?,
        customer: row.get(1)?,
        name: row.get(2)?,
        tags: parse_tags(&tags_json),
        status: ProjectStatus::from_lenient(&status),
        create_time: row.get(5)?,
        month: row.get(6)?,
        project_dir: project_dir.into(),
        description: row.get(8)?,
        part_number: row.get(9)?,
        pinned: pinned != 0,
        last_open_time: row.get(11)?,
        open_count: open_count.max(0) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::project::Project;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn project(id: &str, name: &str, created: &str) -> Project {
        Project {
            id: id.to_string(),
            name: name.to_string(),
            customer: "Acme".to_string(),
            create_time: ts(created),
            status: ProjectStatus::Ongoing,
            tags: Vec::new(),
            item_tags: BTreeMap::new(),
            customer_code: None,
            part_number: None,
            description: None,
            cover_image: None,
            special: false,
            extra: Default::default(),
        }
    }

    fn add(store: &CatalogStore, p: &Project, files: &[&str]) {
        let dir = PathBuf::from(format!("/lib/{}/{}_{}_{}", p.month(), p.id, p.customer, p.name));
        store.upsert_project(p, &dir).unwrap();
        let files: Vec<(String, String)> = files
            .iter()
            .map(|f| (f.to_string(), f.rsplit('/').next().unwrap().to_string()))
            .collect();
        store.replace_project_files(&p.id, &files).unwrap();
    }

    fn fixture(full_text: bool) -> (tempfile::TempDir, CatalogStore) {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), full_text);

        let mut beam = project("PRJ-202401-001", "Front Beam", "2024-01-02T08:00:00");
        beam.tags = vec!["steel".to_string(), "urgent".to_string()];
        add(&store, &beam, &["01_3D文件/beam.step"]);

        let mut tower = project("PRJ-202402-001", "Shock Tower", "2024-02-02T08:00:00");
        tower.tags = vec!["steel".to_string()];
        tower.part_number = Some("ST-100".to_string());
        add(&store, &tower, &["report/tower_xray.pdf"]);

        let mut old = project("PRJ-202301-001", "Front Panel", "2023-01-02T08:00:00");
        old.status = ProjectStatus::Archived;
        add(&store, &old, &[]);

        (tmp, store)
    }

    #[test]
    fn test_empty_query_orders_by_pin_then_recency() {
        let (_tmp, store) = fixture(true);
        let hits = store.search("", 10, false).unwrap();
        assert_eq!(hits.ids, vec!["PRJ-202402-001", "PRJ-202401-001"]);

        store.set_pinned("PRJ-202401-001", true).unwrap();
        let hits = store.search("", 10, true).unwrap();
        assert_eq!(
            hits.ids,
            vec!["PRJ-202401-001", "PRJ-202402-001", "PRJ-202301-001"]
        );

        let hits = store.search("  ", 1, true).unwrap();
        assert_eq!(hits.ids.len(), 1);
    }

    #[test]
    fn test_full_text_search_matches_prefixes_and_files() {
        let (_tmp, store) = fixture(true);
        let hits = store.search("fron", 10, false).unwrap();
        assert!(hits.full_text);
        assert_eq!(hits.ids, vec!["PRJ-202401-001"]);

        let hits = store.search("xray", 10, false).unwrap();
        assert_eq!(hits.ids, vec!["PRJ-202402-001"]);

        let hits = store.search("front", 10, true).unwrap();
        assert_eq!(hits.ids.len(), 2);

        let hits = store.search("front tower", 10, true).unwrap();
        assert!(hits.ids.is_empty());
    }

    #[test]
    fn test_ranked_search_takes_best_hit_across_tables() {
        let build = |full_text: bool| {
            let tmp = tempdir().unwrap();
            let store = open_store(tmp.path(), full_text);
            let hinge = project("PRJ-202401-001", "Hinge", "2024-01-02T08:00:00");
            add(
                &store,
                &hinge,
                &["cad/bracket.step", "cad/hinge.step", "doc/notes.txt", "doc/drawing.pdf"],
            );
            for (id, name, created) in [
                ("PRJ-202403-001", "Bracket Left", "2024-03-02T08:00:00"),
                ("PRJ-202404-001", "Bracket Right", "2024-04-02T08:00:00"),
                ("PRJ-202405-001", "Bracket Rear", "2024-05-02T08:00:00"),
            ] {
                add(&store, &project(id, name, created), &["cad/part.step"]);
            }
            (tmp, store)
        };

        // "bracket" is in most project rows, so only the file hit carries weight
        let (_tmp, store) = build(true);
        let hits = store.search("bracket", 10, false).unwrap();
        assert_eq!(hits.ids.len(), 4);
        assert_eq!(hits.ids[0], "PRJ-202401-001");

        let (_tmp, store) = build(false);
        let hits = store.search("bracket", 10, false).unwrap();
        assert_eq!(
            hits.ids,
            vec!["PRJ-202405-001", "PRJ-202404-001", "PRJ-202403-001", "PRJ-202401-001"]
        );
    }

    #[test]
    fn test_substring_fallback() {
        let (_tmp, store) = fixture(false);
        let hits = store.search("ST-10", 10, false).unwrap();
        assert!(!hits.full_text);
        assert_eq!(hits.ids, vec!["PRJ-202402-001"]);

        let hits = store.search("beam.step", 10, false).unwrap();
        assert_eq!(hits.ids, vec!["PRJ-202401-001"]);
    }

    #[test]
    fn test_fallback_never_returns_what_filters_exclude() {
        let (_tmp_a, ranked) = fixture(true);
        let (_tmp_b, plain) = fixture(false);

        for query in ["front", "steel", "Acme", "tower", "panel"] {
            for include_archived in [false, true] {
                let mut a = ranked.search(query, 50, include_archived).unwrap().ids;
                let mut b = plain.search(query, 50, include_archived).unwrap().ids;
                if !include_archived {
                    assert!(!b.contains(&"PRJ-202301-001".to_string()), "{}", query);
                }
                a.sort();
                b.sort();
                assert_eq!(a, b, "query {}", query);
            }
        }
    }

    #[test]
    fn test_fetch_by_ids_preserves_order() {
        let (_tmp, store) = fixture(true);
        let rows = store
            .fetch_by_ids(&[
                "PRJ-202301-001".to_string(),
                "PRJ-209901-001".to_string(),
                "PRJ-202401-001".to_string(),
            ])
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["PRJ-202301-001", "PRJ-202401-001"]);
        assert_eq!(rows[1].tags, vec!["steel", "urgent"]);
    }

    #[test]
    fn test_dashboard_and_tags() {
        let (_tmp, store) = fixture(true);
        let stats = store
            .dashboard_stats(NaiveDate::from_ymd_opt(2024, 2, 20).unwrap())
            .unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total: 3,
                ongoing: 2,
                delivered: 0,
                archived: 1,
                new_this_month: 1,
            }
        );

        let tags = store.popular_tags(5).unwrap();
        assert_eq!(tags, vec![("steel".to_string(), 2), ("urgent".to_string(), 1)]);

        let months = store.month_counts().unwrap();
        assert_eq!(months[0], ("2024-02".to_string(), 1));
        assert_eq!(months.len(), 3);
    }

    #[test]
    fn test_recent_activity_actions() {
        let (_tmp, store) = fixture(true);
        store
            .mark_opened("PRJ-202301-001", ts("2024-03-01T12:00:00"))
            .unwrap();
        let items = store.recent_activity(2).unwrap();
        assert_eq!(items[0].id, "PRJ-202301-001");
        assert_eq!(items[0].action, ActivityAction::Opened);
        assert_eq!(items[1].id, "PRJ-202402-001");
        assert_eq!(items[1].action, ActivityAction::Created);
    }

    #[test]
    fn test_fts_query_building() {
        assert_eq!(fts_query("front beam"), "\"front\"* AND \"beam\"*");
        assert_eq!(fts_query("it's \"x\""), "\"it\"* AND \"s\"* AND \"x\"*");
    }
}
