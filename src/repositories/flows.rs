//! # Flow Repository
//!
//! Read-only view of the flow graph: the active flow of a client, its ordered
//! steps, per-step ordered options, and the next-by-order linear fallback.
//! The engine never mutates flow data.

use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::models::flow::{Column as FlowColumn, Entity as ClientFlow, Model as FlowModel};
use crate::models::flow_step::{
    Column as StepColumn, Entity as FlowStep, Model as StepModel,
};
use crate::models::flow_step_option::{
    Column as OptionColumn, Entity as FlowStepOption, Model as OptionModel,
};

/// Repository for read-only flow graph access
pub struct FlowRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> FlowRepository<'a> {
    /// Create a new FlowRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// The client's active flow, if any.
    pub async fn active_flow(&self, client_id: Uuid) -> Result<Option<FlowModel>, DbErr> {
        ClientFlow::find()
            .filter(FlowColumn::ClientId.eq(client_id))
            .filter(FlowColumn::IsActive.eq(true))
            .one(self.db)
            .await
    }

    /// Point lookup of a flow a lead is bound to.
    pub async fn flow_by_id(&self, flow_id: Uuid) -> Result<Option<FlowModel>, DbErr> {
        ClientFlow::find_by_id(flow_id).one(self.db).await
    }

    /// First step of a flow by step order.
    pub async fn first_step(&self, flow_id: Uuid) -> Result<Option<StepModel>, DbErr> {
        FlowStep::find()
            .filter(StepColumn::FlowId.eq(flow_id))
            .order_by_asc(StepColumn::StepOrder)
            .limit(1)
            .one(self.db)
            .await
    }

    /// The client's active flow together with its first step.
    ///
    /// Absence of either is a normal, reportable condition: a flow with no
    /// steps is as unusable as no flow at all.
    pub async fn active_flow_bundle(
        &self,
        client_id: Uuid,
    ) -> Result<Option<(FlowModel, StepModel)>, DbErr> {
        let Some(flow) = self.active_flow(client_id).await? else {
            return Ok(None);
        };

        let Some(first_step) = self.first_step(flow.id).await? else {
            return Ok(None);
        };

        Ok(Some((flow, first_step)))
    }

    /// Point lookup of a step.
    pub async fn step_by_id(&self, step_id: Uuid) -> Result<Option<StepModel>, DbErr> {
        FlowStep::find_by_id(step_id).one(self.db).await
    }

    /// A step together with its ordered options.
    pub async fn step_with_options(
        &self,
        step_id: Uuid,
    ) -> Result<Option<(StepModel, Vec<OptionModel>)>, DbErr> {
        let Some(step) = self.step_by_id(step_id).await? else {
            return Ok(None);
        };

        let options = self.options_for_step(step.id).await?;
        Ok(Some((step, options)))
    }

    /// Ordered options of a step.
    pub async fn options_for_step(&self, step_id: Uuid) -> Result<Vec<OptionModel>, DbErr> {
        FlowStepOption::find()
            .filter(OptionColumn::StepId.eq(step_id))
            .order_by_asc(OptionColumn::OptionOrder)
            .all(self.db)
            .await
    }

    /// Linear fallback: the next step of the flow strictly after `from_order`.
    ///
    /// Applied only when a selected option carries no explicit next step.
    pub async fn next_step_by_order(
        &self,
        flow_id: Uuid,
        from_order: i32,
    ) -> Result<Option<StepModel>, DbErr> {
        FlowStep::find()
            .filter(StepColumn::FlowId.eq(flow_id))
            .filter(StepColumn::StepOrder.gt(from_order))
            .order_by_asc(StepColumn::StepOrder)
            .limit(1)
            .one(self.db)
            .await
    }
}
