//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Channel, ChannelEvent, ChannelStatus, Communication, CommunicationType, Department, InboundMap,
    Jurisdiction, Service, ServiceRequest, ServiceRequestComment, StaffDepartment, StaffUser,
    Template,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_staff(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
        ctx: &str,
    ) -> Result<Vec<StaffUser>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))?;

        let mut staff = Vec::new();
        while let Some(row) = next_row(&mut rows, ctx).await? {
            staff.push(row_to_staff(&row)?);
        }
        Ok(staff)
    }

    async fn load_comments(&self, id: Uuid) -> Result<Vec<ServiceRequestComment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMMENT_COLUMNS} FROM service_request_comments WHERE service_request_id = ?1 ORDER BY created_at ASC"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_comments: {e}")))?;

        let mut comments = Vec::new();
        while let Some(row) = next_row(&mut rows, "load_comments").await? {
            comments.push(row_to_comment(&row)?);
        }
        Ok(comments)
    }

    async fn load_inbound_maps(&self, id: Uuid) -> Result<Vec<InboundMap>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INBOUND_MAP_COLUMNS} FROM inbound_maps WHERE service_request_id = ?1 ORDER BY created_at ASC"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_inbound_maps: {e}")))?;

        let mut maps = Vec::new();
        while let Some(row) = next_row(&mut rows, "load_inbound_maps").await? {
            maps.push(row_to_inbound_map(&row)?);
        }
        Ok(maps)
    }

    /// Attach comments and inbound maps to a bare ticket row.
    async fn hydrate(&self, mut request: ServiceRequest) -> Result<ServiceRequest, DatabaseError> {
        request.comments = self.load_comments(request.id).await?;
        request.inbound_maps = self.load_inbound_maps(request.id).await?;
        Ok(request)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }
    Err(DatabaseError::Serialization(format!("bad timestamp {s:?}")))
}

fn parse_public_id(raw: i64) -> Result<u64, DatabaseError> {
    u64::try_from(raw)
        .map_err(|e| DatabaseError::Serialization(format!("bad public id {raw}: {e}")))
}

async fn next_row(rows: &mut libsql::Rows, ctx: &str) -> Result<Option<libsql::Row>, DatabaseError> {
    rows.next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))
}

fn text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::Query(format!("column {idx}: {e}")))
}

fn int(row: &libsql::Row, idx: i32) -> Result<i64, DatabaseError> {
    row.get::<i64>(idx)
        .map_err(|e| DatabaseError::Query(format!("column {idx}: {e}")))
}

fn flag(row: &libsql::Row, idx: i32) -> Result<bool, DatabaseError> {
    int(row, idx).map(|v| v != 0)
}

fn opt_text_col(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T, DatabaseError> {
    s.parse().map_err(DatabaseError::Serialization)
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s}: {e}")))
}

fn bool_int(b: bool) -> i64 {
    i64::from(b)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

const JURISDICTION_COLUMNS: &str = "id, name, workflow_enabled, cx_survey_enabled, reply_to_service_request_enabled, broadcast_to_submitter_on_request_closed, filter_broadcasts_by_department, enforce_assignment_through_department, preferred_broadcast_channel, workflow_broadcast_window, cx_survey_broadcast_window, cx_survey_trigger_status, send_from_email, send_from_email_verified, send_from_phone, reply_to_email";

const STAFF_COLUMNS: &str = "s.id, s.jurisdiction_id, s.email, s.first_name, s.last_name, s.phone, s.is_admin";

const REQUEST_COLUMNS: &str = "id, jurisdiction_id, public_id, status, channel, description, first_name, last_name, email, phone, assigned_to, department_id, service_id, input_channel, close_date, created_at, updated_at";

const COMMENT_COLUMNS: &str = "id, service_request_id, comment, added_by, broadcast_to_submitter, broadcast_to_assignee, broadcast_to_staff, created_at";

const INBOUND_MAP_COLUMNS: &str = "id, channel, jurisdiction_id, department_id, staff_user_id, service_request_id, service_id, created_at";

const COMMUNICATION_COLUMNS: &str = "id, channel, address, type, dispatched, dispatch_payload, dispatch_response, accepted, delivered, service_request_id, created_at";

fn row_to_jurisdiction(row: &libsql::Row) -> Result<Jurisdiction, DatabaseError> {
    let window = |idx| row.get::<i64>(idx).ok().and_then(|v| u32::try_from(v).ok());
    Ok(Jurisdiction {
        id: text(row, 0)?,
        name: text(row, 1)?,
        workflow_enabled: flag(row, 2)?,
        cx_survey_enabled: flag(row, 3)?,
        reply_to_service_request_enabled: flag(row, 4)?,
        broadcast_to_submitter_on_request_closed: flag(row, 5)?,
        filter_broadcasts_by_department: flag(row, 6)?,
        enforce_assignment_through_department: flag(row, 7)?,
        preferred_broadcast_channel: parse_enum(&text(row, 8)?)?,
        workflow_broadcast_window: window(9),
        cx_survey_broadcast_window: window(10),
        cx_survey_trigger_status: parse_enum(&text(row, 11)?)?,
        send_from_email: opt_text_col(row, 12),
        send_from_email_verified: flag(row, 13)?,
        send_from_phone: opt_text_col(row, 14),
        reply_to_email: opt_text_col(row, 15),
    })
}

fn row_to_staff(row: &libsql::Row) -> Result<StaffUser, DatabaseError> {
    Ok(StaffUser {
        id: text(row, 0)?,
        jurisdiction_id: text(row, 1)?,
        email: text(row, 2)?,
        first_name: opt_text_col(row, 3),
        last_name: opt_text_col(row, 4),
        phone: opt_text_col(row, 5),
        is_admin: flag(row, 6)?,
    })
}

fn row_to_request(row: &libsql::Row) -> Result<ServiceRequest, DatabaseError> {
    let channel = match opt_text_col(row, 4) {
        Some(c) => Some(parse_enum(&c)?),
        None => None,
    };
    Ok(ServiceRequest {
        id: parse_uuid(&text(row, 0)?)?,
        jurisdiction_id: text(row, 1)?,
        public_id: parse_public_id(int(row, 2)?)?,
        status: parse_enum(&text(row, 3)?)?,
        channel,
        description: text(row, 5)?,
        first_name: opt_text_col(row, 6),
        last_name: opt_text_col(row, 7),
        email: opt_text_col(row, 8),
        phone: opt_text_col(row, 9),
        assigned_to: opt_text_col(row, 10),
        department_id: opt_text_col(row, 11),
        service_id: opt_text_col(row, 12),
        input_channel: text(row, 13)?,
        close_date: opt_text_col(row, 14)
            .map(|s| parse_datetime(&s))
            .transpose()?,
        created_at: parse_datetime(&text(row, 15)?)?,
        updated_at: parse_datetime(&text(row, 16)?)?,
        comments: Vec::new(),
        inbound_maps: Vec::new(),
    })
}

fn row_to_comment(row: &libsql::Row) -> Result<ServiceRequestComment, DatabaseError> {
    Ok(ServiceRequestComment {
        id: parse_uuid(&text(row, 0)?)?,
        service_request_id: parse_uuid(&text(row, 1)?)?,
        comment: text(row, 2)?,
        added_by: opt_text_col(row, 3),
        broadcast_to_submitter: flag(row, 4)?,
        broadcast_to_assignee: flag(row, 5)?,
        broadcast_to_staff: flag(row, 6)?,
        created_at: parse_datetime(&text(row, 7)?)?,
    })
}

fn row_to_inbound_map(row: &libsql::Row) -> Result<InboundMap, DatabaseError> {
    let service_request_id = match opt_text_col(row, 5) {
        Some(id) => Some(parse_uuid(&id)?),
        None => None,
    };
    Ok(InboundMap {
        id: text(row, 0)?,
        channel: parse_enum(&text(row, 1)?)?,
        jurisdiction_id: text(row, 2)?,
        department_id: opt_text_col(row, 3),
        staff_user_id: opt_text_col(row, 4),
        service_request_id,
        service_id: opt_text_col(row, 6),
        created_at: parse_datetime(&text(row, 7)?)?,
    })
}

fn row_to_communication(row: &libsql::Row) -> Result<Communication, DatabaseError> {
    let json = |idx| -> Result<serde_json::Value, DatabaseError> {
        serde_json::from_str(&text(row, idx)?)
            .map_err(|e| DatabaseError::Serialization(format!("communication column {idx}: {e}")))
    };
    let service_request_id = match opt_text_col(row, 9) {
        Some(id) => Some(parse_uuid(&id)?),
        None => None,
    };
    Ok(Communication {
        id: parse_uuid(&text(row, 0)?)?,
        channel: parse_enum(&text(row, 1)?)?,
        address: text(row, 2)?,
        comm_type: parse_enum(&text(row, 3)?)?,
        dispatched: flag(row, 4)?,
        dispatch_payload: json(5)?,
        dispatch_response: json(6)?,
        accepted: flag(row, 7)?,
        delivered: flag(row, 8)?,
        service_request_id,
        created_at: parse_datetime(&text(row, 10)?)?,
    })
}

fn row_to_channel_status(row: &libsql::Row) -> Result<ChannelStatus, DatabaseError> {
    let log: Vec<ChannelEvent> = serde_json::from_str(&text(row, 3)?)
        .map_err(|e| DatabaseError::Serialization(format!("channel status log: {e}")))?;
    Ok(ChannelStatus {
        id: text(row, 0)?,
        channel: parse_enum(&text(row, 1)?)?,
        is_allowed: row.get::<i64>(2).ok().map(|v| v != 0),
        log,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Jurisdictions ───────────────────────────────────────────────

    async fn insert_jurisdiction(&self, j: &Jurisdiction) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO jurisdictions ({JURISDICTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    j.id.as_str(),
                    j.name.as_str(),
                    bool_int(j.workflow_enabled),
                    bool_int(j.cx_survey_enabled),
                    bool_int(j.reply_to_service_request_enabled),
                    bool_int(j.broadcast_to_submitter_on_request_closed),
                    bool_int(j.filter_broadcasts_by_department),
                    bool_int(j.enforce_assignment_through_department),
                    j.preferred_broadcast_channel.as_str(),
                    opt_int(j.workflow_broadcast_window.map(i64::from)),
                    opt_int(j.cx_survey_broadcast_window.map(i64::from)),
                    j.cx_survey_trigger_status.as_str(),
                    opt_text(j.send_from_email.as_deref()),
                    bool_int(j.send_from_email_verified),
                    opt_text(j.send_from_phone.as_deref()),
                    opt_text(j.reply_to_email.as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_jurisdiction: {e}")))?;

        debug!(jurisdiction_id = %j.id, "Jurisdiction inserted");
        Ok(())
    }

    async fn get_jurisdiction(&self, id: &str) -> Result<Option<Jurisdiction>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JURISDICTION_COLUMNS} FROM jurisdictions WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_jurisdiction: {e}")))?;

        match next_row(&mut rows, "get_jurisdiction").await? {
            Some(row) => Ok(Some(row_to_jurisdiction(&row)?)),
            None => Ok(None),
        }
    }

    // ── Staff, departments, services ────────────────────────────────

    async fn insert_staff_user(&self, s: &StaffUser) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO staff_users (id, jurisdiction_id, email, first_name, last_name, phone, is_admin) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    s.id.as_str(),
                    s.jurisdiction_id.as_str(),
                    s.email.as_str(),
                    opt_text(s.first_name.as_deref()),
                    opt_text(s.last_name.as_deref()),
                    opt_text(s.phone.as_deref()),
                    bool_int(s.is_admin),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_staff_user: {e}")))?;
        Ok(())
    }

    async fn get_staff_user(
        &self,
        jurisdiction_id: &str,
        id: &str,
    ) -> Result<Option<StaffUser>, DatabaseError> {
        let staff = self
            .query_staff(
                &format!(
                    "SELECT {STAFF_COLUMNS} FROM staff_users s WHERE s.jurisdiction_id = ?1 AND s.id = ?2"
                ),
                params![jurisdiction_id, id],
                "get_staff_user",
            )
            .await?;
        Ok(staff.into_iter().next())
    }

    async fn list_admin_staff(
        &self,
        jurisdiction_id: &str,
    ) -> Result<Vec<StaffUser>, DatabaseError> {
        self.query_staff(
            &format!(
                "SELECT {STAFF_COLUMNS} FROM staff_users s WHERE s.jurisdiction_id = ?1 AND s.is_admin = 1 ORDER BY s.id"
            ),
            params![jurisdiction_id],
            "list_admin_staff",
        )
        .await
    }

    async fn list_department_leads(
        &self,
        jurisdiction_id: &str,
        department_id: &str,
    ) -> Result<Vec<StaffUser>, DatabaseError> {
        self.query_staff(
            &format!(
                "SELECT {STAFF_COLUMNS} FROM staff_users s
                 JOIN staff_user_departments d ON d.staff_user_id = s.id
                 WHERE s.jurisdiction_id = ?1 AND d.department_id = ?2 AND d.is_lead = 1
                 ORDER BY s.id"
            ),
            params![jurisdiction_id, department_id],
            "list_department_leads",
        )
        .await
    }

    async fn insert_department(&self, d: &Department) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO departments (id, jurisdiction_id, name) VALUES (?1, ?2, ?3)",
                params![d.id.as_str(), d.jurisdiction_id.as_str(), d.name.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_department: {e}")))?;
        Ok(())
    }

    async fn insert_service(&self, s: &Service) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO services (id, jurisdiction_id, name) VALUES (?1, ?2, ?3)",
                params![s.id.as_str(), s.jurisdiction_id.as_str(), s.name.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_service: {e}")))?;
        Ok(())
    }

    async fn add_staff_department(&self, m: &StaffDepartment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO staff_user_departments (staff_user_id, department_id, is_lead) VALUES (?1, ?2, ?3)
                 ON CONFLICT(staff_user_id, department_id) DO UPDATE SET is_lead = excluded.is_lead",
                params![
                    m.staff_user_id.as_str(),
                    m.department_id.as_str(),
                    bool_int(m.is_lead)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_staff_department: {e}")))?;
        Ok(())
    }

    async fn is_staff_in_department(
        &self,
        staff_user_id: &str,
        department_id: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM staff_user_departments WHERE staff_user_id = ?1 AND department_id = ?2",
                params![staff_user_id, department_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_staff_in_department: {e}")))?;

        match next_row(&mut rows, "is_staff_in_department").await? {
            Some(row) => Ok(int(&row, 0)? > 0),
            None => Ok(false),
        }
    }

    // ── Service requests ────────────────────────────────────────────

    async fn insert_service_request(&self, r: &ServiceRequest) -> Result<u64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO service_requests ({REQUEST_COLUMNS}) VALUES (
                    ?1, ?2,
                    (SELECT COALESCE(MAX(public_id), 0) + 1 FROM service_requests WHERE jurisdiction_id = ?2),
                    ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                r.id.to_string(),
                r.jurisdiction_id.as_str(),
                r.status.as_str(),
                opt_text(r.channel.map(|c| c.as_str())),
                r.description.as_str(),
                opt_text(r.first_name.as_deref()),
                opt_text(r.last_name.as_deref()),
                opt_text(r.email.as_deref()),
                opt_text(r.phone.as_deref()),
                opt_text(r.assigned_to.as_deref()),
                opt_text(r.department_id.as_deref()),
                opt_text(r.service_id.as_deref()),
                r.input_channel.as_str(),
                opt_text(r.close_date.map(|d| d.to_rfc3339()).as_deref()),
                r.created_at.to_rfc3339(),
                r.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_service_request: {e}")))?;

        let mut rows = conn
            .query(
                "SELECT public_id FROM service_requests WHERE id = ?1",
                params![r.id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_service_request: {e}")))?;

        let public_id = match next_row(&mut rows, "insert_service_request").await? {
            Some(row) => parse_public_id(int(&row, 0)?)?,
            None => {
                return Err(DatabaseError::NotFound {
                    entity: "service_request".into(),
                    id: r.id.to_string(),
                });
            }
        };

        debug!(service_request_id = %r.id, public_id, "Service request inserted");
        Ok(public_id)
    }

    async fn get_service_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_service_request: {e}")))?;

        match next_row(&mut rows, "get_service_request").await? {
            Some(row) => Ok(Some(self.hydrate(row_to_request(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn get_service_request_by_public_id(
        &self,
        jurisdiction_id: &str,
        public_id: u64,
    ) -> Result<Option<ServiceRequest>, DatabaseError> {
        let public_id = i64::try_from(public_id)
            .map_err(|e| DatabaseError::Serialization(format!("public id out of range: {e}")))?;
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM service_requests WHERE jurisdiction_id = ?1 AND public_id = ?2"
                ),
                params![jurisdiction_id, public_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_service_request_by_public_id: {e}")))?;

        match next_row(&mut rows, "get_service_request_by_public_id").await? {
            Some(row) => Ok(Some(self.hydrate(row_to_request(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn update_service_request(&self, r: &ServiceRequest) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE service_requests SET status = ?1, channel = ?2, assigned_to = ?3, department_id = ?4,
                 service_id = ?5, close_date = ?6, updated_at = ?7 WHERE id = ?8",
                params![
                    r.status.as_str(),
                    opt_text(r.channel.map(|c| c.as_str())),
                    opt_text(r.assigned_to.as_deref()),
                    opt_text(r.department_id.as_deref()),
                    opt_text(r.service_id.as_deref()),
                    opt_text(r.close_date.map(|d| d.to_rfc3339()).as_deref()),
                    r.updated_at.to_rfc3339(),
                    r.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_service_request: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "service_request".into(),
                id: r.id.to_string(),
            });
        }
        debug!(service_request_id = %r.id, status = %r.status, "Service request updated");
        Ok(())
    }

    async fn insert_comment(&self, c: &ServiceRequestComment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO service_request_comments ({COMMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    c.id.to_string(),
                    c.service_request_id.to_string(),
                    c.comment.as_str(),
                    opt_text(c.added_by.as_deref()),
                    bool_int(c.broadcast_to_submitter),
                    bool_int(c.broadcast_to_assignee),
                    bool_int(c.broadcast_to_staff),
                    c.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_comment: {e}")))?;
        Ok(())
    }

    // ── Inbound maps ────────────────────────────────────────────────

    async fn insert_inbound_map(&self, m: &InboundMap) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO inbound_maps ({INBOUND_MAP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    m.id.as_str(),
                    m.channel.as_str(),
                    m.jurisdiction_id.as_str(),
                    opt_text(m.department_id.as_deref()),
                    opt_text(m.staff_user_id.as_deref()),
                    opt_text(m.service_request_id.map(|id| id.to_string()).as_deref()),
                    opt_text(m.service_id.as_deref()),
                    m.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| match e {
                libsql::Error::SqliteFailure(_, ref msg) if msg.contains("UNIQUE") => {
                    DatabaseError::Constraint(format!("inbound map {} already exists", m.id))
                }
                other => DatabaseError::Query(format!("insert_inbound_map: {other}")),
            })?;

        debug!(inbound_map_id = %m.id, channel = %m.channel, "Inbound map inserted");
        Ok(())
    }

    async fn get_inbound_map(&self, id: &str) -> Result<Option<InboundMap>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INBOUND_MAP_COLUMNS} FROM inbound_maps WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_inbound_map: {e}")))?;

        match next_row(&mut rows, "get_inbound_map").await? {
            Some(row) => Ok(Some(row_to_inbound_map(&row)?)),
            None => Ok(None),
        }
    }

    // ── Communications ──────────────────────────────────────────────

    async fn insert_communication(&self, c: &Communication) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO communications ({COMMUNICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    c.id.to_string(),
                    c.channel.as_str(),
                    c.address.as_str(),
                    c.comm_type.as_str(),
                    bool_int(c.dispatched),
                    c.dispatch_payload.to_string(),
                    c.dispatch_response.to_string(),
                    bool_int(c.accepted),
                    bool_int(c.delivered),
                    opt_text(c.service_request_id.map(|id| id.to_string()).as_deref()),
                    c.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_communication: {e}")))?;

        debug!(communication_id = %c.id, channel = %c.channel, "Communication recorded");
        Ok(())
    }

    async fn list_communications(
        &self,
        service_request_id: Uuid,
    ) -> Result<Vec<Communication>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMMUNICATION_COLUMNS} FROM communications WHERE service_request_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![service_request_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_communications: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = next_row(&mut rows, "list_communications").await? {
            out.push(row_to_communication(&row)?);
        }
        Ok(out)
    }

    // ── Channel status ──────────────────────────────────────────────

    async fn get_channel_status(
        &self,
        address: &str,
    ) -> Result<Option<ChannelStatus>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, channel, is_allowed, log FROM channel_statuses WHERE id = ?1",
                params![address],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_channel_status: {e}")))?;

        match next_row(&mut rows, "get_channel_status").await? {
            Some(row) => Ok(Some(row_to_channel_status(&row)?)),
            None => Ok(None),
        }
    }

    async fn record_channel_event(
        &self,
        address: &str,
        channel: Channel,
        event: &str,
        allowed: Option<bool>,
    ) -> Result<ChannelStatus, DatabaseError> {
        let mut status = self
            .get_channel_status(address)
            .await?
            .unwrap_or_else(|| ChannelStatus::new(address, channel));
        status.record(event, allowed);

        let log = serde_json::to_string(&status.log)
            .map_err(|e| DatabaseError::Serialization(format!("channel status log: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO channel_statuses (id, channel, is_allowed, log, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET is_allowed = excluded.is_allowed, log = excluded.log, updated_at = excluded.updated_at",
                params![
                    address,
                    status.channel.as_str(),
                    opt_int(status.is_allowed.map(bool_int)),
                    log,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_channel_event: {e}")))?;

        debug!(address, event, ?allowed, "Channel event recorded");
        Ok(status)
    }

    // ── Templates ───────────────────────────────────────────────────

    async fn get_template(
        &self,
        jurisdiction_id: &str,
        channel: Channel,
        name: &str,
        comm_type: CommunicationType,
    ) -> Result<Option<Template>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT jurisdiction_id, channel, name, type, content FROM templates
                 WHERE jurisdiction_id = ?1 AND channel = ?2 AND name = ?3 AND type = ?4",
                params![jurisdiction_id, channel.as_str(), name, comm_type.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_template: {e}")))?;

        match next_row(&mut rows, "get_template").await? {
            Some(row) => Ok(Some(Template {
                jurisdiction_id: text(&row, 0)?,
                channel: parse_enum(&text(&row, 1)?)?,
                name: text(&row, 2)?,
                comm_type: parse_enum(&text(&row, 3)?)?,
                content: text(&row, 4)?,
            })),
            None => Ok(None),
        }
    }

    async fn upsert_template(&self, t: &Template) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO templates (jurisdiction_id, channel, name, type, content, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(jurisdiction_id, channel, name, type) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
                params![
                    t.jurisdiction_id.as_str(),
                    t.channel.as_str(),
                    t.name.as_str(),
                    t.comm_type.as_str(),
                    t.content.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_template: {e}")))?;
        Ok(())
    }
}
