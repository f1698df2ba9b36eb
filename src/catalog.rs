use crate::models::{Course, CourseRegistration};

/// The fixed set of offerable courses. Built once at startup and shared with
/// handlers behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Catalog {
    courses: Vec<Course>,
}

fn course(id: &str, name: &str) -> Course {
    Course {
        id: id.to_string(),
        name: name.to_string(),
    }
}

impl Catalog {
    pub fn fixed() -> Catalog {
        Catalog {
            courses: vec![
                course("cloud-fund", "Cloud Computing Fundamentals"),
                course("dbms", "Database Management Systems"),
                course("os", "Operating Systems"),
                course("networks", "Computer Networks"),
                course("ml-intro", "Introduction to Machine Learning"),
            ],
        }
    }

    /// Every course, in catalog order. The order is the same on every call.
    pub fn list_all(&self) -> &[Course] {
        &self.courses
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// Catalog minus the courses already present in `registered`.
    pub fn available_for(&self, registered: &[CourseRegistration]) -> Vec<&Course> {
        self.courses
            .iter()
            .filter(|c| !registered.iter().any(|r| r.course_id == c.id))
            .collect()
    }
}
