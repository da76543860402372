mod calculator;
mod dining;

use std::time::Duration;

use calculator::CalcEngine;
use qp_core::qf::Framework;

fn run_calculator_demo() {
    let mut calc = CalcEngine::new(14);
    calc.press_digit('1');
    calc.press_digit('2');
    calc.press_op('+');
    calc.press_digit('7');
    calc.press_equals();
    println!("qcalc: 12 + 7 = {}", calc.display().trim());
}

fn run_dining_demo() {
    let framework = Framework::new();
    let count = 5;
    let max_feed = 5;
    let (mut table, mut philosophers, _eating) = dining::spawn_table(&framework, count, max_feed);

    while framework.is_running() {
        framework.tick();
        std::thread::sleep(Duration::from_millis(qp_core::qf::TICK_MS));
    }

    table.stop();
    for p in &mut philosophers {
        p.stop();
    }
    println!("qdpp: every philosopher finished {max_feed} feedings");
}

fn main() {
    env_logger::init();
    run_calculator_demo();
    run_dining_demo();
}
