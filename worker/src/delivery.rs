use relay::{queue::Job, Context};

pub async fn process(ctx: &Context, job: &Job) -> crate::JobResult<()> {
	tracing::debug!("delivering {} job to {} (attempt {})", job.kind, job.inbox, job.attempt + 1);
	ctx.fetcher().push(&job.inbox, &job.payload).await?;
	Ok(())
}
