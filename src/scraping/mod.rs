pub mod browser_manager;
