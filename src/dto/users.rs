use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Subscription, UserProfile};

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<UserProfile>)]
    pub items: Vec<UserProfile>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct SubscriptionList {
    #[schema(value_type = Vec<Subscription>)]
    pub items: Vec<Subscription>,
}
