//! # Lead Repository
//!
//! Lead lifecycle operations: open-lead resolution, reopen-cooldown checks,
//! creation, and the conditional status transitions (operator claim and
//! close) that must not double-fire under concurrent requests.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::lead::{
    ActiveModel, Column, ConversationStatus, Entity as Lead, Model, RoutingState,
};
use crate::models::to_db_time;

/// Fields required to create a fresh lead
#[derive(Debug, Clone)]
pub struct NewLead {
    pub client_id: Uuid,
    pub wa_user_id: String,
    pub wa_profile_name: Option<String>,
    pub flow_id: Uuid,
    pub current_step_id: Uuid,
}

/// Repository for Lead database operations
pub struct LeadRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> LeadRepository<'a> {
    /// Create a new LeadRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// The most recent open lead of a (client, WhatsApp user) pair.
    ///
    /// Open means ACTIVE, HUMAN_REQUIRED, or HUMAN_TAKEN; at most one such
    /// lead exists per pair by construction.
    pub async fn find_open(
        &self,
        client_id: Uuid,
        wa_user_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        Lead::find()
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::WaUserId.eq(wa_user_id))
            .filter(Column::ConversationStatus.is_in(ConversationStatus::open_statuses()))
            .order_by_desc(Column::CreatedAt)
            .limit(1)
            .one(self.db)
            .await
    }

    /// Whether the pair has a CLOSED lead inside the reopen cooldown window.
    pub async fn closed_within(
        &self,
        client_id: Uuid,
        wa_user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let count = Lead::find()
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::WaUserId.eq(wa_user_id))
            .filter(Column::ConversationStatus.eq(ConversationStatus::Closed.as_str()))
            .filter(Column::ClosedAt.gt(to_db_time(cutoff)))
            .count(self.db)
            .await?;

        Ok(count > 0)
    }

    /// Create a fresh ACTIVE lead bound to the active flow's first step.
    pub async fn create(&self, new_lead: NewLead, now: DateTime<Utc>) -> Result<Model, DbErr> {
        let lead = ActiveModel {
            id: Set(Uuid::new_v4()),
            client_id: Set(new_lead.client_id),
            wa_user_id: Set(new_lead.wa_user_id),
            wa_profile_name: Set(new_lead.wa_profile_name),
            conversation_status: Set(ConversationStatus::Active.as_str().to_string()),
            human_required_reason: Set(None),
            routing_state: Set(RoutingState::Routing.as_str().to_string()),
            score: Set(0),
            flow_id: Set(Some(new_lead.flow_id)),
            current_step_id: Set(Some(new_lead.current_step_id)),
            reminders_sent: Set(0),
            irrelevant_streak: Set(0),
            free_text_summary: Set(None),
            extracted_fields: Set(None),
            notified_at: Set(None),
            last_user_message_at: Set(Some(to_db_time(now))),
            last_bot_message_at: Set(None),
            closed_at: Set(None),
            created_at: Set(to_db_time(now)),
            updated_at: Set(to_db_time(now)),
        };

        lead.insert(self.db).await
    }

    /// Point lookup by id, scoped to the owning client.
    pub async fn find_by_id(
        &self,
        client_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Model>, DbErr> {
        Lead::find_by_id(lead_id)
            .filter(Column::ClientId.eq(client_id))
            .one(self.db)
            .await
    }

    /// Point lookup by id without tenant scoping (operator surface).
    pub async fn find_any_by_id(&self, lead_id: Uuid) -> Result<Option<Model>, DbErr> {
        Lead::find_by_id(lead_id).one(self.db).await
    }

    /// Operator claim: HUMAN_REQUIRED -> HUMAN_TAKEN.
    ///
    /// Conditional on the current status so concurrent claims are mutually
    /// exclusive; returns whether this caller won the transition.
    pub async fn claim_for_operator(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = Lead::update_many()
            .col_expr(
                Column::ConversationStatus,
                Expr::value(ConversationStatus::HumanTaken.as_str()),
            )
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::Id.eq(lead_id))
            .filter(Column::ConversationStatus.eq(ConversationStatus::HumanRequired.as_str()))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Operator close: any open status -> CLOSED.
    ///
    /// Returns whether a row actually transitioned (false when the lead was
    /// already CLOSED or does not exist).
    pub async fn close_by_operator(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = Lead::update_many()
            .col_expr(
                Column::ConversationStatus,
                Expr::value(ConversationStatus::Closed.as_str()),
            )
            .col_expr(Column::ClosedAt, Expr::value(Some(to_db_time(now))))
            .col_expr(
                Column::RoutingState,
                Expr::value(RoutingState::Routing.as_str()),
            )
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::Id.eq(lead_id))
            .filter(Column::ConversationStatus.is_in(ConversationStatus::open_statuses()))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }
}
