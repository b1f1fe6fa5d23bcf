use crate::server::ServerRouter;

mod comments;
mod hearts;
mod members;
mod posts;
mod sub_comments;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(members::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(sub_comments::routes())
        .merge(hearts::routes())
}
