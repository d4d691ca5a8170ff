use alpidesim::config::init_config;
use alpidesim::config::Cfg;
use alpidesim::controller::init_controller;
use alpidesim::stats::StatType;

pub fn main() -> std::process::ExitCode {
    if let Err(e) = init_config() {
        eprintln!("{e}");
        return std::process::ExitCode::from(1);
    };

    alpidesim::util::lib::init_error_logger(Cfg::global());

    // Launch controller thread
    // On a fatal error the controller raises the stop flag for the simulation loop
    let (controller, stat_send_chan, stop_flag, any_errors_flag) = init_controller(Cfg::global());

    // Handles SIGINT, SIGTERM and SIGHUP (as the `termination` feature is enabled)
    alpidesim::util::lib::init_ctrlc_handler(stop_flag.clone());

    let exit_code: u8 =
        match alpidesim::run_simulation(Cfg::global(), stat_send_chan.clone(), stop_flag) {
            Ok(()) => 0,
            Err(e) => {
                stat_send_chan
                    .send(StatType::Fatal(e.to_string().into()))
                    .unwrap();
                1
            }
        };
    drop(stat_send_chan);

    controller.join().expect("Failed to join stats thread");

    alpidesim::util::lib::exit(exit_code, &any_errors_flag)
}
