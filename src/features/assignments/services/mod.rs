mod assignment_manager;

pub use assignment_manager::AssignmentManager;
