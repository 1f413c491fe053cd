mod assignment;

pub use assignment::{Assignment, AssignmentStatus};
