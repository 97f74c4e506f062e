//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Channel, ChannelStatus, Communication, CommunicationType, Department, InboundMap, Jurisdiction,
    Service, ServiceRequest, ServiceRequestComment, StaffDepartment, StaffUser, Template,
};

/// Backend-agnostic database trait covering tenants, tickets, staff,
/// correlation maps, audit records and channel status.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Jurisdictions ───────────────────────────────────────────────

    async fn insert_jurisdiction(&self, jurisdiction: &Jurisdiction) -> Result<(), DatabaseError>;

    async fn get_jurisdiction(&self, id: &str) -> Result<Option<Jurisdiction>, DatabaseError>;

    // ── Staff, departments, services ────────────────────────────────

    async fn insert_staff_user(&self, staff: &StaffUser) -> Result<(), DatabaseError>;

    /// Look up a staff user scoped to a jurisdiction.
    async fn get_staff_user(
        &self,
        jurisdiction_id: &str,
        id: &str,
    ) -> Result<Option<StaffUser>, DatabaseError>;

    /// All staff flagged admin for the jurisdiction.
    async fn list_admin_staff(&self, jurisdiction_id: &str)
    -> Result<Vec<StaffUser>, DatabaseError>;

    /// Staff who lead the given department.
    async fn list_department_leads(
        &self,
        jurisdiction_id: &str,
        department_id: &str,
    ) -> Result<Vec<StaffUser>, DatabaseError>;

    async fn insert_department(&self, department: &Department) -> Result<(), DatabaseError>;

    async fn insert_service(&self, service: &Service) -> Result<(), DatabaseError>;

    async fn add_staff_department(&self, membership: &StaffDepartment)
    -> Result<(), DatabaseError>;

    async fn is_staff_in_department(
        &self,
        staff_user_id: &str,
        department_id: &str,
    ) -> Result<bool, DatabaseError>;

    // ── Service requests ────────────────────────────────────────────

    /// Insert a ticket, assigning the next public id for its jurisdiction.
    /// Returns the assigned public id.
    async fn insert_service_request(&self, request: &ServiceRequest) -> Result<u64, DatabaseError>;

    /// Load a ticket with its comments and inbound maps.
    async fn get_service_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, DatabaseError>;

    async fn get_service_request_by_public_id(
        &self,
        jurisdiction_id: &str,
        public_id: u64,
    ) -> Result<Option<ServiceRequest>, DatabaseError>;

    /// Persist mutable ticket fields (status, assignee, department, close date).
    async fn update_service_request(&self, request: &ServiceRequest) -> Result<(), DatabaseError>;

    async fn insert_comment(&self, comment: &ServiceRequestComment) -> Result<(), DatabaseError>;

    // ── Inbound maps ────────────────────────────────────────────────

    async fn insert_inbound_map(&self, map: &InboundMap) -> Result<(), DatabaseError>;

    /// Exact-match lookup by map id.
    async fn get_inbound_map(&self, id: &str) -> Result<Option<InboundMap>, DatabaseError>;

    // ── Communications ──────────────────────────────────────────────

    async fn insert_communication(&self, communication: &Communication)
    -> Result<(), DatabaseError>;

    /// Audit records for a ticket, oldest first.
    async fn list_communications(
        &self,
        service_request_id: Uuid,
    ) -> Result<Vec<Communication>, DatabaseError>;

    // ── Channel status ──────────────────────────────────────────────

    async fn get_channel_status(&self, address: &str)
    -> Result<Option<ChannelStatus>, DatabaseError>;

    /// Prepend an event to an address's log, creating the status if needed.
    async fn record_channel_event(
        &self,
        address: &str,
        channel: Channel,
        event: &str,
        allowed: Option<bool>,
    ) -> Result<ChannelStatus, DatabaseError>;

    // ── Templates ───────────────────────────────────────────────────

    async fn get_template(
        &self,
        jurisdiction_id: &str,
        channel: Channel,
        name: &str,
        comm_type: CommunicationType,
    ) -> Result<Option<Template>, DatabaseError>;

    async fn upsert_template(&self, template: &Template) -> Result<(), DatabaseError>;
}
