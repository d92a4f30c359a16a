// Prevents additional console window on Windows in release builds
// DO NOT REMOVE - without this, Windows will show both the GUI and a console window
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    // Stop the backend before going down so a panic never leaves it orphaned
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {:?}", panic_info);
        resume_shell_lib::cleanup_on_panic();
        std::process::exit(1);
    }));

    resume_shell_lib::run();
}
