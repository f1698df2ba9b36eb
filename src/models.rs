use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub srn: String,
    pub password_hash: String,
    pub registered_courses: Json<Vec<CourseRegistration>>,
    pub created_at: DateTime<Utc>,
}

/// One entry in a student's `registered_courses` array. The course name is
/// denormalized so registrations render without a catalog lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRegistration {
    pub course_id: String,
    pub course_name: String,
    pub registered_at: DateTime<Utc>,
}

/// Server-side session row, keyed by the `ssid` cookie. Carries a snapshot
/// of the student's identity taken at login/signup time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentSession {
    pub ssid: String,
    pub belongs_to: Uuid,
    pub name: String,
    pub email: String,
    pub srn: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: String,
    pub name: String,
}
