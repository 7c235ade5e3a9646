use crate::application::engine::LaundryEngine;
use crate::domain::order::{
    NewOrder, OrderHeaderId, OrderStatus, ReviewSubmission, StatusUpdate, ViewKind,
};
use crate::domain::payment::{PaymentId, PaymentStatus};
use crate::domain::user::Actor;
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;

/// One line of the host's command stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateOrder {
        actor: Actor,
        order: NewOrder,
    },
    GetOrder {
        id: OrderHeaderId,
        #[serde(default)]
        view: ViewKind,
    },
    ListAll {
        actor: Actor,
    },
    ListByBranch {
        actor: Actor,
        branch_id: String,
        #[serde(default)]
        payment_status: Option<PaymentStatus>,
    },
    /// `status` matches basket status, unlike the branch listing's payment filter.
    ListByUser {
        user_id: String,
        #[serde(default)]
        status: Option<OrderStatus>,
    },
    UpdateStatus {
        actor: Actor,
        update: StatusUpdate,
    },
    UpdateReview {
        actor: Actor,
        review: ReviewSubmission,
    },
    SoftDelete {
        actor: Actor,
        id: OrderHeaderId,
    },
    SettlePayment {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    Sweep,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateOrder { .. } => "create_order",
            Self::GetOrder { .. } => "get_order",
            Self::ListAll { .. } => "list_all",
            Self::ListByBranch { .. } => "list_by_branch",
            Self::ListByUser { .. } => "list_by_user",
            Self::UpdateStatus { .. } => "update_status",
            Self::UpdateReview { .. } => "update_review",
            Self::SoftDelete { .. } => "soft_delete",
            Self::SettlePayment { .. } => "settle_payment",
            Self::Sweep => "sweep",
        }
    }

    /// Runs the command and renders its result as JSON.
    pub async fn execute(self, engine: &LaundryEngine) -> Result<Value> {
        let orders = engine.orders();
        let value = match self {
            Self::CreateOrder { actor, order } => {
                serde_json::to_value(orders.create_order(order, &actor).await?)?
            }
            Self::GetOrder { id, view } => serde_json::to_value(orders.get_order(id, view).await?)?,
            Self::ListAll { actor } => serde_json::to_value(orders.list_all(&actor).await?)?,
            Self::ListByBranch {
                actor,
                branch_id,
                payment_status,
            } => serde_json::to_value(
                orders
                    .list_by_branch(&branch_id, &actor, payment_status)
                    .await?,
            )?,
            Self::ListByUser { user_id, status } => {
                serde_json::to_value(orders.list_by_user(&user_id, status).await?)?
            }
            Self::UpdateStatus { actor, update } => {
                serde_json::to_value(orders.update_status(update, &actor).await?)?
            }
            Self::UpdateReview { actor, review } => {
                serde_json::to_value(orders.update_review(review, &actor).await?)?
            }
            Self::SoftDelete { actor, id } => {
                serde_json::to_value(orders.soft_delete(id, &actor).await?)?
            }
            Self::SettlePayment { payment_id, status } => {
                serde_json::to_value(orders.settle_payment(payment_id, status).await?)?
            }
            Self::Sweep => serde_json::to_value(engine.run_sweep_once().await?)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::Role;

    #[test]
    fn test_parse_tagged_commands() {
        let line = r#"{"op":"list_by_branch","actor":{"user_id":"m1","role":"BranchManager"},"branch_id":"b1","payment_status":"Paid"}"#;
        let command: Command = serde_json::from_str(line).unwrap();
        assert_eq!(
            command,
            Command::ListByBranch {
                actor: Actor::new("m1", Role::BranchManager),
                branch_id: "b1".into(),
                payment_status: Some(PaymentStatus::Paid),
            }
        );
        assert_eq!(command.name(), "list_by_branch");

        let sweep: Command = serde_json::from_str(r#"{"op":"sweep"}"#).unwrap();
        assert_eq!(sweep, Command::Sweep);
    }

    #[test]
    fn test_list_by_user_filters_on_basket_status() {
        let line = r#"{"op":"list_by_user","user_id":"u1","status":"Processing"}"#;
        assert_eq!(
            serde_json::from_str::<Command>(line).unwrap(),
            Command::ListByUser {
                user_id: "u1".into(),
                status: Some(OrderStatus::Processing),
            }
        );
        let payment = r#"{"op":"list_by_user","user_id":"u1","status":"Paid"}"#;
        assert!(serde_json::from_str::<Command>(payment).is_err());
    }

    #[test]
    fn test_get_order_defaults_to_full_view() {
        let line = r#"{"op":"get_order","id":"67e55044-10b1-426f-9247-bb680e5fe0c8"}"#;
        match serde_json::from_str::<Command>(line).unwrap() {
            Command::GetOrder { view, .. } => assert_eq!(view, ViewKind::Full),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"op":"refund"}"#).is_err());
    }
}
