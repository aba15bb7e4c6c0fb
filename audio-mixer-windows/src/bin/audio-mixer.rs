//! Headless host: mixes the remembered microphone and system audio into the
//! remembered playback device until Enter is pressed.
//!
//! `RUST_LOG` controls log verbosity (default `info`).

#[cfg(target_os = "windows")]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = host::run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "windows"))]
fn main() {
    eprintln!("audio-mixer needs the Windows audio stack (WASAPI)");
    std::process::exit(1);
}

#[cfg(target_os = "windows")]
mod host {
    use std::io::{self, Write};
    use std::sync::Arc;

    use audio_mixer_core::{
        AudioDevice, MixerController, MixerError, SessionConfiguration, SessionDelegate, SessionState, SettingsStore,
    };
    use audio_mixer_windows::WasapiBackend;

    const METER_WIDTH: usize = 40;

    struct ConsoleDelegate;

    impl SessionDelegate for ConsoleDelegate {
        fn on_state_changed(&self, state: SessionState) {
            log::info!("Session {state}");
        }

        fn on_microphone_level(&self, level: f32) {
            let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round()) as usize;
            print!("\rmic [{:<width$}] {:>5.3}", "#".repeat(filled), level, width = METER_WIDTH);
            let _ = io::stdout().flush();
        }

        fn on_warning(&self, message: &str) {
            log::warn!("{message}");
        }

        fn on_error(&self, error: &MixerError) {
            log::error!("{error}");
        }
    }

    fn print_devices(title: &str, devices: &[AudioDevice], selected: Option<&AudioDevice>) {
        println!("{title}:");
        for device in devices {
            let marker = if selected.is_some_and(|s| s.id == device.id) { '*' } else { ' ' };
            let default = if device.is_default { " (default)" } else { "" };
            println!(" {marker} {}{default}", device.name);
        }
    }

    pub fn run() -> Result<(), MixerError> {
        let store = SettingsStore::default_location()?;
        log::info!("Settings at {}", store.path().display());

        let controller = MixerController::new(WasapiBackend::new(), SessionConfiguration::default(), store)?;
        controller.set_delegate(Arc::new(ConsoleDelegate));

        print_devices("Inputs", &controller.input_devices()?, controller.selected_input().as_ref());
        print_devices("Outputs", &controller.output_devices()?, controller.selected_output().as_ref());
        if controller.selected_output().is_some_and(|d| d.is_default) {
            log::warn!("Output is the default playback device; system audio capture will hear the mix itself");
        }

        controller.start()?;
        println!("Mixing. Press Enter to stop.");

        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        println!();

        let diagnostics = controller.diagnostics();
        controller.shutdown();
        log::info!(
            "Session {}: {} mic / {} system callbacks, {} mic / {} system underruns",
            diagnostics.session_id,
            diagnostics.mic_callback_count,
            diagnostics.system_callback_count,
            diagnostics.mic_underruns,
            diagnostics.system_underruns
        );
        Ok(())
    }
}
