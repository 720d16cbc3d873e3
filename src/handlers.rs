use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::avatars::ObjectUrls;
use crate::comments::{self, CommentError, CommentThread};
use crate::concerts::{self, filter::ConcertFilter};
use crate::core::errors::ApiError;
use crate::core::helpers::{html_ok, json_created, json_ok};
use crate::core::query_params::{get_bool_flag, parse_query_params};
use crate::friends::FriendBook;
use crate::models::models::{ConcertInput, ProfileUpdate};
use crate::pages;
use crate::profiles;
use crate::session::Session;
use crate::templates;

#[derive(Deserialize)]
pub struct ConcertPayload {
    #[serde(flatten)]
    pub concert: ConcertInput,
    #[serde(default)]
    pub bands: Vec<i64>,
}

impl ConcertPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.concert.date_start.trim().is_empty() {
            return Err(ApiError::BadRequest("date_start is required".to_string()));
        }
        if self.concert.is_festival && self.concert.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(ApiError::BadRequest("Festivals need a name".to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct SeenPayload {
    pub bands: Vec<i64>,
}

#[derive(Deserialize)]
pub struct CommentPayload {
    pub content: String,
}

#[derive(Deserialize)]
pub struct FriendPayload {
    pub receiver_id: String,
}

fn home_filter(req: &HttpRequest) -> ConcertFilter {
    ConcertFilter::from_params(&parse_query_params(req.query_string()))
}

pub async fn home_page(session: Session, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let view = pages::load_home(&session, home_filter(&req)).await?;
    Ok(html_ok(templates::render_home_page(&view)))
}

pub async fn list_concerts(session: Session, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let view = pages::load_home(&session, home_filter(&req)).await?;
    Ok(json_ok(&view))
}

pub async fn concert_page(session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let view = pages::load_concert(&session, &path).await?;
    Ok(html_ok(templates::render_concert_page(&view, chrono::Utc::now())))
}

pub async fn get_concert(session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let view = pages::load_concert(&session, &path).await?;
    Ok(json_ok(&view))
}

pub async fn create_concert(session: Session, body: web::Json<ConcertPayload>) -> Result<HttpResponse, ApiError> {
    session.require_user()?;
    body.validate()?;

    let concert = concerts::add_concert(&session.store, &body.concert, &body.bands).await?;
    Ok(json_created(&concert))
}

pub async fn update_concert(
    session: Session,
    path: web::Path<String>,
    body: web::Json<ConcertPayload>,
) -> Result<HttpResponse, ApiError> {
    session.require_user()?;
    body.validate()?;

    let concert = concerts::edit_concert(&session.store, &path, &body.concert, &body.bands).await?;
    Ok(json_ok(&concert))
}

pub async fn set_bands_seen(
    session: Session,
    path: web::Path<String>,
    body: web::Json<SeenPayload>,
) -> Result<HttpResponse, ApiError> {
    let user_id = session.require_user()?;
    let rows = concerts::set_bands_seen(&session.store, &path, user_id, &body.bands).await?;
    Ok(json_ok(&rows))
}

pub async fn list_comments(session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let thread = CommentThread::load(&session.store, &path).await?;
    let comments: Vec<_> = thread.comments().collect();
    Ok(json_ok(&comments))
}

pub async fn create_comment(
    session: Session,
    path: web::Path<String>,
    body: web::Json<CommentPayload>,
) -> Result<HttpResponse, ApiError> {
    let user_id = session.require_user()?;

    let mut thread = CommentThread::new(path.into_inner(), Vec::new());
    thread.set_draft(body.into_inner().content);
    let comment = thread.post(&session.store, user_id).await?;
    Ok(json_created(comment))
}

pub async fn edit_comment(
    session: Session,
    path: web::Path<i64>,
    body: web::Json<CommentPayload>,
) -> Result<HttpResponse, ApiError> {
    let user_id = session.require_user()?;
    let id = path.into_inner();

    let mut thread = comments::load_single(&session.store, id).await?;
    thread.begin_edit(id, user_id)?;
    thread.update_draft(id, body.into_inner().content)?;
    thread.submit_edit(&session.store, id, user_id).await?;

    let entry = thread.entry(id).ok_or(CommentError::NotFound(id))?;
    Ok(json_ok(&entry.comment))
}

pub async fn delete_comment(session: Session, path: web::Path<i64>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = session.require_user()?;
    let id = path.into_inner();

    if !get_bool_flag(&parse_query_params(req.query_string()), "confirm") {
        return Err(CommentError::NotConfirmed.into());
    }

    let mut thread = comments::load_single(&session.store, id).await?;
    thread.request_delete(id, user_id)?;
    thread.confirm_delete(&session.store, id, user_id).await?;
    Ok(json_ok(&json!({"status": "deleted", "id": id})))
}

pub async fn profile_page(
    session: Session,
    urls: web::Data<ObjectUrls>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let view = pages::load_profile(&session, &urls, &path).await?;
    Ok(html_ok(templates::render_profile_page(&view)))
}

pub async fn get_profile(
    session: Session,
    urls: web::Data<ObjectUrls>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let view = pages::load_profile(&session, &urls, &path).await?;
    Ok(json_ok(&view))
}

pub async fn update_profile(session: Session, body: web::Json<ProfileUpdate>) -> Result<HttpResponse, ApiError> {
    let user_id = session.require_user()?;
    let profile = profiles::update_profile(&session.store, user_id, &body).await?;
    Ok(json_ok(&profile))
}

async fn viewer_book(session: &Session) -> Result<FriendBook, ApiError> {
    let user_id = session.require_user()?;
    Ok(FriendBook::load(&session.store, user_id).await?)
}

pub async fn send_friend_request(session: Session, body: web::Json<FriendPayload>) -> Result<HttpResponse, ApiError> {
    let mut book = viewer_book(&session).await?;
    let receiver = body.into_inner().receiver_id;

    book.send(&session.store, &receiver).await.into_result()?;
    Ok(json_created(&json!({"state": book.state_with(&receiver)})))
}

pub async fn accept_friend_request(session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let mut book = viewer_book(&session).await?;
    let sender = path.into_inner();

    book.accept(&session.store, &sender).await.into_result()?;
    Ok(json_ok(&json!({"state": book.state_with(&sender)})))
}

/// Withdraw (as sender) or reject (as receiver) a pending request.
pub async fn cancel_friend_request(
    session: Session,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (sender, receiver) = path.into_inner();
    let user_id = session.require_user()?;
    let other = if user_id == sender {
        receiver
    } else if user_id == receiver {
        sender
    } else {
        return Err(ApiError::Forbidden);
    };

    let mut book = viewer_book(&session).await?;
    book.cancel(&session.store, &other).await.into_result()?;
    Ok(json_ok(&json!({"state": book.state_with(&other)})))
}

pub async fn remove_friend(session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let mut book = viewer_book(&session).await?;
    let other = path.into_inner();

    book.remove(&session.store, &other).await.into_result()?;
    info!(user_id = %book.profile_id, other = %other, "friendship removed");
    Ok(json_ok(&json!({"state": book.state_with(&other)})))
}

pub async fn serve_blob(urls: web::Data<ObjectUrls>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let blob = urls
        .get(&path)
        .ok_or_else(|| ApiError::NotFound("Object URL revoked or unknown".to_string()))?;
    Ok(HttpResponse::Ok().content_type(blob.content_type).body(blob.bytes))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home_page))
        .route("/concerts/{id}", web::get().to(concert_page))
        .route("/users/{username}", web::get().to(profile_page))
        .route("/blob/{id}", web::get().to(serve_blob))
        .service(
            web::scope("/api")
                .route("/concerts", web::get().to(list_concerts))
                .route("/concerts", web::post().to(create_concert))
                .route("/concerts/{id}", web::get().to(get_concert))
                .route("/concerts/{id}", web::put().to(update_concert))
                .route("/concerts/{id}/seen", web::post().to(set_bands_seen))
                .route("/concerts/{id}/comments", web::get().to(list_comments))
                .route("/concerts/{id}/comments", web::post().to(create_comment))
                .route("/comments/{id}", web::put().to(edit_comment))
                .route("/comments/{id}", web::delete().to(delete_comment))
                .route("/users/{username}", web::get().to(get_profile))
                .route("/profile", web::put().to(update_profile))
                .route("/friends", web::post().to(send_friend_request))
                .route("/friends/{sender_id}/accept", web::post().to(accept_friend_request))
                .route("/friends/{sender_id}/{receiver_id}", web::delete().to(cancel_friend_request))
                .route("/friendships/{other_id}", web::delete().to(remove_friend)),
        );
}
