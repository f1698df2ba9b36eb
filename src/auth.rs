use chrono::{Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::err::Error;
use crate::models::{Student, StudentSession};

pub const SESSION_COOKIE: &str = "ssid";
const SESSION_HOURS: i64 = 24;

/// Salted one-way hash. The salt is fresh per call, so hashing the same
/// password twice yields different strings.
pub fn hash_password(password: &str) -> Result<String, Error> {
    Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map(|hash| hash.to_string())
        .map_err(|err| Error::internal("HashError", err.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(_) => false,
    }
}

// Well-formed hash that matches no password (the digest is all zero bytes).
const DUMMY_HASH: &str =
    "$pbkdf2-sha256$i=600000$c2FsdHNhbHRzYWx0c2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Burns the same hashing cost as a real verification. Login calls this
/// when no account matches the email, so response timing does not reveal
/// whether the email or the password was wrong.
pub fn verify_dummy(password: &str) {
    let _ = verify_password(password, DUMMY_HASH);
}

/// Opaque session id: 32 random bytes mixed with the configured secret,
/// hashed and hex-encoded.
fn new_session_id(secret: &str) -> String {
    let random: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(random);
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn open_session(
    pg: &PgPool,
    student: &Student,
    secret: &str,
) -> Result<StudentSession, Error> {
    let session = StudentSession {
        ssid: new_session_id(secret),
        belongs_to: student.uuid,
        name: student.name.clone(),
        email: student.email.clone(),
        srn: student.srn.clone(),
        expires_at: Utc::now() + Duration::hours(SESSION_HOURS),
    };
    sqlx::query("INSERT INTO student_sessions VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(&session.ssid)
        .bind(session.belongs_to)
        .bind(&session.name)
        .bind(&session.email)
        .bind(&session.srn)
        .bind(session.expires_at)
        .execute(pg)
        .await?;
    Ok(session)
}

/// Looks up a session by id. Expired sessions are deleted and treated as
/// absent; live ones get their 24-hour window slid forward.
pub async fn session_for(pg: &PgPool, ssid: &str) -> Result<Option<StudentSession>, Error> {
    if ssid.is_empty() {
        return Ok(None);
    }
    let session =
        sqlx::query_as::<_, StudentSession>("SELECT * FROM student_sessions WHERE ssid = $1 LIMIT 1")
            .bind(ssid)
            .fetch_optional(pg)
            .await?;
    let mut session = match session {
        Some(session) => session,
        None => return Ok(None),
    };
    if Utc::now() > session.expires_at {
        sqlx::query("DELETE FROM student_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(pg)
            .await?;
        return Ok(None);
    }
    let expires_at = Utc::now() + Duration::hours(SESSION_HOURS);
    sqlx::query("UPDATE student_sessions SET expires_at = $2 WHERE ssid = $1")
        .bind(ssid)
        .bind(expires_at)
        .execute(pg)
        .await?;
    session.expires_at = expires_at;
    Ok(Some(session))
}

pub async fn drop_session(pg: &PgPool, ssid: &str) -> Result<(), Error> {
    sqlx::query("DELETE FROM student_sessions WHERE ssid = $1")
        .bind(ssid)
        .execute(pg)
        .await?;
    Ok(())
}

pub fn session_cookie(ssid: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        ssid,
        SESSION_HOURS * 3600
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_original_password() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash));
    }

    #[test]
    fn verify_rejects_other_passwords() {
        let hash = hash_password("secret1").unwrap();
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("", &hash));
        assert!(!verify_password("secret1 ", &hash));
    }

    #[test]
    fn hash_is_salted_and_never_plaintext() {
        let a = hash_password("secret1").unwrap();
        let b = hash_password("secret1").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("secret1"));
    }

    #[test]
    fn verify_tolerates_garbage_hashes() {
        assert!(!verify_password("secret1", "not a phc string"));
    }

    #[test]
    fn dummy_hash_parses_but_matches_nothing() {
        // the hash must parse so verification runs at full cost
        assert!(PasswordHash::new(DUMMY_HASH).is_ok());
        assert!(!verify_password("secret1", DUMMY_HASH));
        assert!(!verify_password("", DUMMY_HASH));
        verify_dummy("secret1");
    }

    #[test]
    fn session_ids_are_opaque_hex() {
        let a = new_session_id("s3cret");
        let b = new_session_id("s3cret");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc123");
        assert!(cookie.starts_with("ssid=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }
}
