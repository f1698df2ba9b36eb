//! HTML rendering. Pages are small enough that they are assembled with
//! `format!` against a shared layout; every user-supplied string goes
//! through [`escape`] first.

use axum::response::Html;

use crate::models::{Course, CourseRegistration, Student};

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(title: &str, nav: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title} - Campus Registration</title></head>\n<body>\n<nav>{nav}</nav>\n<h1>{title}</h1>\n{body}\n</body>\n</html>",
        title = escape(title),
        nav = nav,
        body = body
    ))
}

const NAV_PUBLIC: &str =
    "<a href=\"/signup\">Sign up</a> | <a href=\"/login\">Log in</a> | <a href=\"/students\">Students</a>";
const NAV_STUDENT: &str =
    "<a href=\"/courses\">Courses</a> | <a href=\"/my-courses\">My courses</a> | <a href=\"/students\">Students</a> | <a href=\"/logout\">Log out</a>";

fn field_error(message: Option<&'static str>) -> String {
    match message {
        Some(message) => format!("<p class=\"error\">{}</p>", message),
        None => String::new(),
    }
}

/// Per-field messages for the signup form. `None` renders nothing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FieldErrors {
    pub name: Option<&'static str>,
    pub email: Option<&'static str>,
    pub srn: Option<&'static str>,
    pub password: Option<&'static str>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        *self == FieldErrors::default()
    }
}

/// Signup form. Submitted values are echoed back on validation failure,
/// except the password, which is never reflected.
pub fn signup_page(name: &str, email: &str, srn: &str, errors: &FieldErrors) -> Html<String> {
    let body = format!(
        "<form method=\"post\" action=\"/signup\">\n\
         <label>Name <input name=\"name\" value=\"{name}\"></label>{name_err}\n\
         <label>Email <input name=\"email\" value=\"{email}\"></label>{email_err}\n\
         <label>SRN <input name=\"srn\" value=\"{srn}\"></label>{srn_err}\n\
         <label>Password <input name=\"password\" type=\"password\"></label>{password_err}\n\
         <button type=\"submit\">Sign up</button>\n\
         </form>\n\
         <p>Already have an account? <a href=\"/login\">Log in</a></p>",
        name = escape(name),
        email = escape(email),
        srn = escape(srn),
        name_err = field_error(errors.name),
        email_err = field_error(errors.email),
        srn_err = field_error(errors.srn),
        password_err = field_error(errors.password),
    );
    layout("Sign up", NAV_PUBLIC, &body)
}

pub fn login_page(error: Option<&'static str>) -> Html<String> {
    let body = format!(
        "{error}<form method=\"post\" action=\"/login\">\n\
         <label>Email <input name=\"email\"></label>\n\
         <label>Password <input name=\"password\" type=\"password\"></label>\n\
         <button type=\"submit\">Log in</button>\n\
         </form>\n\
         <p>New here? <a href=\"/signup\">Sign up</a></p>",
        error = field_error(error),
    );
    layout("Log in", NAV_PUBLIC, &body)
}

/// The catalog minus whatever the student already registered for.
pub fn courses_page(student_name: &str, available: &[&Course]) -> Html<String> {
    let rows: String = available
        .iter()
        .map(|course| {
            format!(
                "<li>{name} <form method=\"post\" action=\"/courses/{id}/register\"><button type=\"submit\">Register</button></form></li>\n",
                name = escape(&course.name),
                id = escape(&course.id),
            )
        })
        .collect();
    let listing = if available.is_empty() {
        "<p>You are registered for every course.</p>".to_string()
    } else {
        format!("<ul>\n{}</ul>", rows)
    };
    let body = format!(
        "<p>Welcome, {}.</p>\n{}",
        escape(student_name),
        listing
    );
    layout("Available Courses", NAV_STUDENT, &body)
}

pub fn my_courses_page(student_name: &str, registered: &[CourseRegistration]) -> Html<String> {
    let rows: String = registered
        .iter()
        .map(|reg| {
            format!(
                "<li>{name} <small>registered {at}</small></li>\n",
                name = escape(&reg.course_name),
                at = reg.registered_at.format("%Y-%m-%d %H:%M"),
            )
        })
        .collect();
    let listing = if registered.is_empty() {
        "<p>No registrations yet. <a href=\"/courses\">Browse the catalog.</a></p>".to_string()
    } else {
        format!("<ul>\n{}</ul>", rows)
    };
    let body = format!("<p>{}</p>\n{}", escape(student_name), listing);
    layout("My Courses", NAV_STUDENT, &body)
}

/// All students, newest first.
pub fn students_page(students: &[Student]) -> Html<String> {
    let rows: String = students
        .iter()
        .map(|student| {
            format!(
                "<tr><td>{name}</td><td>{email}</td><td>{srn}</td><td>{count}</td><td>{joined}</td></tr>\n",
                name = escape(&student.name),
                email = escape(&student.email),
                srn = escape(&student.srn),
                count = student.registered_courses.len(),
                joined = student.created_at.format("%Y-%m-%d"),
            )
        })
        .collect();
    let body = format!(
        "<table>\n<tr><th>Name</th><th>Email</th><th>SRN</th><th>Courses</th><th>Joined</th></tr>\n{}</table>",
        rows
    );
    layout("Students", NAV_PUBLIC, &body)
}

pub fn not_found_page(path: &str) -> Html<String> {
    let body = format!("<p>No page at <code>{}</code>.</p>", escape(path));
    layout("Not Found", NAV_PUBLIC, &body)
}
