use chrono::Utc;
use sqlx::postgres::PgDatabaseError;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::err::{DuplicateField, Error};
use crate::models::{CourseRegistration, Student};

/// Creates the tables on startup. Uniqueness of email and SRN lives in the
/// database so concurrent signups racing on the same value lose cleanly.
pub async fn prepare(pg: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS students (
            uuid UUID PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            srn TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            registered_courses JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pg)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS student_sessions (
            ssid TEXT PRIMARY KEY,
            belongs_to UUID NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            srn TEXT NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pg)
    .await?;
    Ok(())
}

pub async fn create(
    pg: &PgPool,
    name: &str,
    email: &str,
    srn: &str,
    password_hash: &str,
) -> Result<Student, Error> {
    let student = Student {
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        srn: srn.to_string(),
        password_hash: password_hash.to_string(),
        registered_courses: Json(Vec::new()),
        created_at: Utc::now(),
    };
    sqlx::query("INSERT INTO students VALUES ($1, $2, $3, $4, $5, $6, $7)")
        .bind(student.uuid)
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.srn)
        .bind(&student.password_hash)
        .bind(&student.registered_courses)
        .bind(student.created_at)
        .execute(pg)
        .await
        .map_err(|err| match duplicate_field(&err) {
            Some(field) => Error::Duplicate(field),
            None => Error::from(err),
        })?;
    Ok(student)
}

/// Maps a unique-constraint violation to the colliding field. Collisions
/// that cannot be attributed go to email, which is checked first.
fn duplicate_field(err: &sqlx::Error) -> Option<DuplicateField> {
    let db = err.as_database_error()?;
    if db.code().as_deref() != Some("23505") {
        return None;
    }
    match db
        .try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg| pg.constraint())
    {
        Some("students_srn_key") => Some(DuplicateField::Srn),
        _ => Some(DuplicateField::Email),
    }
}

pub async fn find_by_email_or_srn(
    pg: &PgPool,
    email: &str,
    srn: &str,
) -> Result<Option<Student>, Error> {
    let student =
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE email = $1 OR srn = $2 LIMIT 1")
            .bind(email)
            .bind(srn)
            .fetch_optional(pg)
            .await?;
    Ok(student)
}

pub async fn find_by_id(pg: &PgPool, id: Uuid) -> Result<Option<Student>, Error> {
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE uuid = $1 LIMIT 1")
        .bind(id)
        .fetch_optional(pg)
        .await?;
    Ok(student)
}

pub async fn find_by_email(pg: &PgPool, email: &str) -> Result<Option<Student>, Error> {
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE email = $1 LIMIT 1")
        .bind(email)
        .fetch_optional(pg)
        .await?;
    Ok(student)
}

/// All students, newest first.
pub async fn list_all(pg: &PgPool) -> Result<Vec<Student>, Error> {
    let students =
        sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY created_at DESC")
            .fetch_all(pg)
            .await?;
    Ok(students)
}

/// Appends a registration to the student's `registered_courses` array,
/// unless an entry with the same course id is already there. The check and
/// the append are one statement, so two racing requests cannot both append.
pub async fn add_course_registration(
    pg: &PgPool,
    student_id: Uuid,
    course_id: &str,
    course_name: &str,
) -> Result<Student, Error> {
    let entry = Json(vec![CourseRegistration {
        course_id: course_id.to_string(),
        course_name: course_name.to_string(),
        registered_at: Utc::now(),
    }]);
    let marker = serde_json::json!([{ "course_id": course_id }]);
    sqlx::query(
        "UPDATE students SET registered_courses = registered_courses || $2
         WHERE uuid = $1 AND NOT (registered_courses @> $3)",
    )
    .bind(student_id)
    .bind(entry)
    .bind(marker)
    .execute(pg)
    .await?;
    find_by_id(pg, student_id).await?.ok_or_else(|| {
        Error::internal(
            "StoreError",
            format!("student {} vanished during registration", student_id),
        )
    })
}
