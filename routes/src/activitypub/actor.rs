use axum::extract::State;
use relay::{model::Actor, Context};

use crate::builders::JsonLD;

pub async fn view(State(ctx): State<Context>) -> JsonLD<Actor> {
	JsonLD(ctx.actor().clone())
}
