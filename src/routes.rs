use std::sync::Arc;

use axum::extract::{Extension, Form, Path};
use axum::handler::Handler;
use axum::headers::Cookie;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Router, TypedHeader};
use serde::Deserialize;
use sqlx::PgPool;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::err::{self, DuplicateField, Error};
use crate::models::{Student, StudentSession};
use crate::views::{self, FieldErrors};
use crate::{auth, store};

const MSG_NAME_REQUIRED: &str = "Name is required";
const MSG_EMAIL_INVALID: &str = "Enter a valid email address";
const MSG_SRN_REQUIRED: &str = "SRN is required";
const MSG_PASSWORD_SHORT: &str = "Password must be at least 6 characters";
const MSG_EMAIL_TAKEN: &str = "An account with this email already exists";
const MSG_SRN_TAKEN: &str = "An account with this SRN already exists";
const MSG_BAD_LOGIN: &str = "Invalid email or password";

pub fn router(pg: PgPool, catalog: Arc<Catalog>, config: Arc<Config>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/signup", get(signup_form).post(signup))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/courses", get(courses))
        .route("/courses/:id/register", post(register_course))
        .route("/my-courses", get(my_courses))
        .route("/students", get(students))
        .fallback(err::handler404.into_service())
        .layer(Extension(pg))
        .layer(Extension(catalog))
        .layer(Extension(config))
}

async fn index() -> Redirect {
    Redirect::to("/signup")
}

async fn signup_form() -> Response {
    views::signup_page("", "", "", &FieldErrors::default()).into_response()
}

async fn login_form() -> Response {
    views::login_page(None).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    name: String,
    email: String,
    srn: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    email: String,
    password: String,
}

/// Validated, normalized signup input: name/SRN trimmed, email trimmed and
/// lower-cased, SRN upper-cased.
#[derive(Debug)]
struct NewStudent {
    name: String,
    email: String,
    srn: String,
    password: String,
}

fn email_is_well_formed(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn validate_signup(form: &SignupForm) -> Result<NewStudent, FieldErrors> {
    let name = form.name.trim();
    let email = form.email.trim().to_lowercase();
    let srn = form.srn.trim().to_uppercase();
    let mut errors = FieldErrors::default();
    if name.is_empty() {
        errors.name = Some(MSG_NAME_REQUIRED);
    }
    if !email_is_well_formed(&email) {
        errors.email = Some(MSG_EMAIL_INVALID);
    }
    if srn.is_empty() {
        errors.srn = Some(MSG_SRN_REQUIRED);
    }
    if form.password.chars().count() < 6 {
        errors.password = Some(MSG_PASSWORD_SHORT);
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(NewStudent {
        name: name.to_string(),
        email,
        srn,
        password: form.password.clone(),
    })
}

fn duplicate_errors(field: DuplicateField) -> FieldErrors {
    match field {
        DuplicateField::Email => FieldErrors {
            email: Some(MSG_EMAIL_TAKEN),
            ..FieldErrors::default()
        },
        DuplicateField::Srn => FieldErrors {
            srn: Some(MSG_SRN_TAKEN),
            ..FieldErrors::default()
        },
    }
}

fn rerender_signup(form: &SignupForm, errors: FieldErrors) -> Response {
    views::signup_page(&form.name, &form.email, &form.srn, &errors).into_response()
}

/// Attributes a pre-insert collision to one field. Email wins when the
/// existing record collides on both email and SRN.
fn collided_field(existing: &Student, email: &str) -> DuplicateField {
    if existing.email == email {
        DuplicateField::Email
    } else {
        DuplicateField::Srn
    }
}

/// Attaches a fresh session cookie so the client-side Max-Age slides along
/// with the server-side expiry.
fn with_session_cookie(session: &StudentSession, response: Response) -> Result<Response, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&auth::session_cookie(&session.ssid))
            .map_err(|err| Error::internal("CookieError", err.to_string()))?,
    );
    Ok((headers, response).into_response())
}

fn respond_with_session(session: &StudentSession) -> Result<Response, Error> {
    with_session_cookie(session, Redirect::to("/courses").into_response())
}

async fn signup(
    Extension(pg): Extension<PgPool>,
    Extension(config): Extension<Arc<Config>>,
    Form(form): Form<SignupForm>,
) -> Result<Response, Error> {
    let new = match validate_signup(&form) {
        Ok(new) => new,
        Err(errors) => return Ok(rerender_signup(&form, errors)),
    };
    if let Some(existing) = store::find_by_email_or_srn(&pg, &new.email, &new.srn).await? {
        let field = collided_field(&existing, &new.email);
        return Ok(rerender_signup(&form, duplicate_errors(field)));
    }
    let password_hash = auth::hash_password(&new.password)?;
    let student = match store::create(&pg, &new.name, &new.email, &new.srn, &password_hash).await {
        Ok(student) => student,
        // lost a race with a concurrent signup on the same email/SRN
        Err(Error::Duplicate(field)) => return Ok(rerender_signup(&form, duplicate_errors(field))),
        Err(err) => return Err(err),
    };
    log::info!("student {} signed up", student.uuid);
    let session = auth::open_session(&pg, &student, &config.session_secret).await?;
    respond_with_session(&session)
}

async fn login(
    Extension(pg): Extension<PgPool>,
    Extension(config): Extension<Arc<Config>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, Error> {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() || form.password.is_empty() {
        return Ok(views::login_page(Some(MSG_BAD_LOGIN)).into_response());
    }
    // unknown email and wrong password produce the same message, and the
    // unknown-email path still pays for a verification
    let student = match store::find_by_email(&pg, &email).await? {
        Some(student) if auth::verify_password(&form.password, &student.password_hash) => student,
        Some(_) => return Ok(views::login_page(Some(MSG_BAD_LOGIN)).into_response()),
        None => {
            auth::verify_dummy(&form.password);
            return Ok(views::login_page(Some(MSG_BAD_LOGIN)).into_response());
        }
    };
    let session = auth::open_session(&pg, &student, &config.session_secret).await?;
    respond_with_session(&session)
}

async fn logout(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
) -> Result<Response, Error> {
    if let Some(ssid) = ssid_from(&cookies) {
        auth::drop_session(&pg, &ssid).await?;
    }
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&auth::clear_session_cookie())
            .map_err(|err| Error::internal("CookieError", err.to_string()))?,
    );
    Ok((headers, Redirect::to("/login")).into_response())
}

fn ssid_from(cookies: &Option<TypedHeader<Cookie>>) -> Option<String> {
    cookies
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(auth::SESSION_COOKIE))
        .map(str::to_string)
}

/// Resolves the session cookie or bails with a redirect to `/login`.
async fn require_session(
    pg: &PgPool,
    cookies: &Option<TypedHeader<Cookie>>,
) -> Result<StudentSession, Error> {
    let ssid = ssid_from(cookies).ok_or(Error::Unauthenticated)?;
    auth::session_for(pg, &ssid).await?.ok_or(Error::Unauthenticated)
}

async fn student_for(pg: &PgPool, session: &StudentSession) -> Result<Student, Error> {
    store::find_by_id(pg, session.belongs_to).await?.ok_or_else(|| {
        Error::internal(
            "StoreError",
            format!("session {} points at a missing student", session.ssid),
        )
    })
}

async fn courses(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(catalog): Extension<Arc<Catalog>>,
) -> Result<Response, Error> {
    let session = require_session(&pg, &cookies).await?;
    let student = student_for(&pg, &session).await?;
    let available = catalog.available_for(&student.registered_courses.0);
    with_session_cookie(
        &session,
        views::courses_page(&session.name, &available).into_response(),
    )
}

async fn register_course(
    Path(course_id): Path<String>,
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(catalog): Extension<Arc<Catalog>>,
) -> Result<Response, Error> {
    let session = require_session(&pg, &cookies).await?;
    let course = catalog
        .find_by_id(&course_id)
        .ok_or(Error::UnknownCourse { id: course_id })?;
    store::add_course_registration(&pg, session.belongs_to, &course.id, &course.name).await?;
    log::info!("student {} registered for {}", session.belongs_to, course.id);
    with_session_cookie(&session, Redirect::to("/my-courses").into_response())
}

async fn my_courses(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
) -> Result<Response, Error> {
    let session = require_session(&pg, &cookies).await?;
    let student = student_for(&pg, &session).await?;
    with_session_cookie(
        &session,
        views::my_courses_page(&session.name, &student.registered_courses.0).into_response(),
    )
}

async fn students(Extension(pg): Extension<PgPool>) -> Result<Response, Error> {
    let students = store::list_all(&pg).await?;
    Ok(views::students_page(&students).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    // The lazy pool never connects on the paths these tests exercise.
    fn test_app() -> Router {
        let pg = PgPool::connect_lazy("postgres://localhost/campusreg_test").unwrap();
        let config = Config {
            port: 0,
            database_url: String::new(),
            session_secret: "test-secret".to_string(),
        };
        router(pg, Arc::new(Catalog::fixed()), Arc::new(config))
    }

    fn get_req(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn form_req(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_redirects_to_signup() {
        let res = test_app().oneshot(get_req("/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/signup");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let res = test_app().oneshot(get_req("/nope")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signup_and_login_forms_render() {
        for path in ["/signup", "/login"] {
            let res = test_app().oneshot(get_req(path)).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn protected_routes_redirect_anonymous_users_to_login() {
        for req in [
            get_req("/courses"),
            get_req("/my-courses"),
            form_req("/courses/cloud-fund/register", ""),
        ] {
            let res = test_app().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
            assert_eq!(res.headers()[header::LOCATION], "/login");
        }
    }

    #[tokio::test]
    async fn logout_without_session_clears_cookie_and_redirects() {
        let res = test_app().oneshot(get_req("/logout")).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/login");
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn signup_with_short_password_rerenders_form() {
        let res = test_app()
            .oneshot(form_req("/signup", "name=A&email=a%40x.com&srn=s1&password=abc"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_with_missing_fields_rerenders_form() {
        let res = test_app()
            .oneshot(form_req("/signup", "name=&email=&srn=&password="))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_with_empty_fields_shows_generic_error() {
        let res = test_app()
            .oneshot(form_req("/login", "email=&password="))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn validation_normalizes_fields() {
        let form = SignupForm {
            name: "  Ada Lovelace  ".into(),
            email: " Ada@X.COM ".into(),
            srn: " pes1ug21cs001 ".into(),
            password: "secret1".into(),
        };
        let new = validate_signup(&form).unwrap();
        assert_eq!(new.name, "Ada Lovelace");
        assert_eq!(new.email, "ada@x.com");
        assert_eq!(new.srn, "PES1UG21CS001");
        assert_eq!(new.password, "secret1");
    }

    #[test]
    fn validation_flags_each_bad_field() {
        let form = SignupForm {
            name: "   ".into(),
            email: "not-an-email".into(),
            srn: String::new(),
            password: "short".into(),
        };
        let errors = validate_signup(&form).unwrap_err();
        assert_eq!(errors.name, Some(MSG_NAME_REQUIRED));
        assert_eq!(errors.email, Some(MSG_EMAIL_INVALID));
        assert_eq!(errors.srn, Some(MSG_SRN_REQUIRED));
        assert_eq!(errors.password, Some(MSG_PASSWORD_SHORT));
    }

    #[test]
    fn email_format_rules() {
        assert!(email_is_well_formed("a@x.com"));
        assert!(email_is_well_formed("first.last@sub.example.org"));
        assert!(!email_is_well_formed(""));
        assert!(!email_is_well_formed("a@"));
        assert!(!email_is_well_formed("@x.com"));
        assert!(!email_is_well_formed("a@nodot"));
        assert!(!email_is_well_formed("a@.com"));
        assert!(!email_is_well_formed("a@x.com."));
        assert!(!email_is_well_formed("a@b@x.com"));
    }

    fn existing_student(email: &str, srn: &str) -> Student {
        Student {
            uuid: uuid::Uuid::new_v4(),
            name: "Ada".to_string(),
            email: email.to_string(),
            srn: srn.to_string(),
            password_hash: "phc".to_string(),
            registered_courses: sqlx::types::Json(Vec::new()),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn email_collision_reported_before_srn() {
        // the record found by find_by_email_or_srn collides on both fields
        let existing = existing_student("a@x.com", "S1");
        assert_eq!(collided_field(&existing, "a@x.com"), DuplicateField::Email);
    }

    #[test]
    fn srn_collision_reported_when_email_differs() {
        let existing = existing_student("a@x.com", "S1");
        assert_eq!(collided_field(&existing, "b@x.com"), DuplicateField::Srn);
    }

    #[test]
    fn session_cookie_is_reissued_on_authenticated_responses() {
        let session = StudentSession {
            ssid: "abc123".to_string(),
            belongs_to: uuid::Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "a@x.com".to_string(),
            srn: "S1".to_string(),
            expires_at: chrono::Utc::now(),
        };
        let res = with_session_cookie(&session, Redirect::to("/my-courses").into_response()).unwrap();
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("ssid=abc123;"));
        assert!(cookie.contains("Max-Age=86400"));
    }

    #[test]
    fn duplicate_errors_point_at_one_field() {
        assert_eq!(
            duplicate_errors(DuplicateField::Email).email,
            Some(MSG_EMAIL_TAKEN)
        );
        assert_eq!(duplicate_errors(DuplicateField::Srn).srn, Some(MSG_SRN_TAKEN));
    }
}
