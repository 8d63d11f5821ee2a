//! End-to-end scan scenarios driven through the public engine API.
//!
//! Each scan step is one `update(1s, 1 Hz)` call, so `dt = 1s` per scan.

use rung_dsl::parse_source;
use rung_runtime::{Engine, OrderPolicy};

fn engine(source: &str) -> Engine {
    Engine::new(parse_source(source).unwrap())
}

fn scan(e: &mut Engine) {
    e.update(1.0, 1.0, true, false);
}

#[test]
fn two_input_and() {
    let mut e = engine("IN A, B\nOUT Y\nAND g(A, B) -> Y\n");

    e.set_signal("A", true);
    e.set_signal("B", false);
    scan(&mut e);
    assert!(!e.signal_value("Y"));

    e.set_signal("B", true);
    scan(&mut e);
    assert!(e.signal_value("Y"));

    e.set_signal("A", false);
    scan(&mut e);
    assert!(!e.signal_value("Y"));
}

#[test]
fn rising_edge_pulse() {
    let mut e = engine("IN CLK\nOUT P\nPS p(CLK) -> P\n");

    let clk = [false, true, true, true, false, true];
    let expect = [false, true, false, false, false, true];
    for (i, (&c, &want)) in clk.iter().zip(&expect).enumerate() {
        e.set_signal("CLK", c);
        scan(&mut e);
        assert_eq!(e.signal_value("P"), want, "scan {i}");
    }
}

#[test]
fn falling_edge_pulse() {
    let mut e = engine("IN CLK\nOUT N\nNS n(CLK) -> N\n");

    let clk = [true, true, false, false, true, false];
    let expect = [false, false, true, false, false, true];
    for (i, (&c, &want)) in clk.iter().zip(&expect).enumerate() {
        e.set_signal("CLK", c);
        scan(&mut e);
        assert_eq!(e.signal_value("N"), want, "scan {i}");
    }
}

#[test]
fn on_delay_timer() {
    let mut e = engine("IN X\nOUT Q\nTON t(\"2s\", X) -> Q\n");

    e.set_signal("X", true);
    let expect = [false, false, true];
    for (i, &want) in expect.iter().enumerate() {
        scan(&mut e);
        assert_eq!(e.signal_value("Q"), want, "scan {i}");
    }

    // input drop resets output and elapsed in the same scan
    e.set_signal("X", false);
    scan(&mut e);
    assert!(!e.signal_value("Q"));
    assert_eq!(e.elapsed_time("t"), 0.0);
}

#[test]
fn on_delay_elapsed_is_monotonic() {
    let mut e = engine("IN X\nOUT Q\nTON t(\"10s\", X) -> Q\n");
    e.set_signal("X", true);
    scan(&mut e);

    let mut prev = e.elapsed_time("t");
    for _ in 0..8 {
        scan(&mut e);
        let now = e.elapsed_time("t");
        assert!(now >= prev);
        prev = now;
    }
}

#[test]
fn off_delay_timer() {
    let mut e = engine("IN X\nOUT Q\nTOF t(\"2s\", X) -> Q\n");

    let x = [true, true, false, false, false];
    let expect = [true, true, true, true, false];
    for (i, (&xv, &want)) in x.iter().zip(&expect).enumerate() {
        e.set_signal("X", xv);
        scan(&mut e);
        assert_eq!(e.signal_value("Q"), want, "scan {i}");
    }
}

#[test]
fn up_counter() {
    let mut e = engine("IN CU, R\nOUT Q\nCTU c(3, CU, R) -> Q, CV\n");

    let cu = [false, true, false, true, false, true, false];
    let expect_cv = [0, 1, 1, 2, 2, 3, 3];
    let expect_q = [false, false, false, false, false, true, true];
    for i in 0..cu.len() {
        e.set_signal("CU", cu[i]);
        scan(&mut e);
        assert_eq!(e.current_count("c"), expect_cv[i], "scan {i}");
        assert_eq!(e.analog_value("CV"), expect_cv[i] as u8, "scan {i}");
        assert_eq!(e.signal_value("Q"), expect_q[i], "scan {i}");
    }

    // reset forces the count to zero on the next commit
    e.set_signal("R", true);
    scan(&mut e);
    assert_eq!(e.current_count("c"), 0);
    assert!(!e.signal_value("Q"));
}

#[test]
fn up_counter_saturates() {
    let mut e = engine("IN CU, R\nOUT Q\nCTU c(3, CU, R) -> Q\n");
    e.set_current_count("c", 32766);

    for _ in 0..3 {
        e.set_signal("CU", true);
        scan(&mut e);
        e.set_signal("CU", false);
        scan(&mut e);
    }
    assert_eq!(e.current_count("c"), 32767);
    assert!(e.signal_value("Q"));
}

#[test]
fn down_counter_loads_and_saturates() {
    let mut e = engine("IN CD, LD\nOUT Q\nCTD c(3, CD, LD) -> Q, CV\n");

    // hard-coded preset loads the count at start
    scan(&mut e);
    assert_eq!(e.current_count("c"), 3);
    assert!(!e.signal_value("Q"));

    for want in [2, 1, 0] {
        e.set_signal("CD", true);
        scan(&mut e);
        assert_eq!(e.current_count("c"), want);
        e.set_signal("CD", false);
        scan(&mut e);
    }
    assert!(e.signal_value("Q"));

    // saturates at zero
    e.set_signal("CD", true);
    scan(&mut e);
    assert_eq!(e.current_count("c"), 0);

    // load pulls the preset back in
    e.set_signal("CD", false);
    e.set_signal("LD", true);
    scan(&mut e);
    assert_eq!(e.current_count("c"), 3);
    assert!(!e.signal_value("Q"));
}

#[test]
fn set_dominant_bistable() {
    let mut e = engine("IN S, R\nOUT Q\nSR b(S, R) -> Q\n");

    let seq = [
        (false, false, false),
        (true, false, true),
        (false, false, true),
        (false, true, false),
        (false, false, false),
        (true, true, true),
    ];
    for (i, &(s, r, want)) in seq.iter().enumerate() {
        e.set_signal("S", s);
        e.set_signal("R", r);
        scan(&mut e);
        assert_eq!(e.signal_value("Q"), want, "scan {i}");
    }
}

#[test]
fn reset_dominant_bistable() {
    let mut e = engine("IN S, R\nOUT Q\nRS b(S, R) -> Q\n");

    let seq = [
        (false, false, false),
        (true, false, true),
        (false, false, true),
        (false, true, false),
        (false, false, false),
        (true, true, false),
    ];
    for (i, &(s, r, want)) in seq.iter().enumerate() {
        e.set_signal("S", s);
        e.set_signal("R", r);
        scan(&mut e);
        assert_eq!(e.signal_value("Q"), want, "scan {i}");
    }
}

#[test]
fn analog_comparators() {
    let source = "AIN LEVEL\nOUT LOW, HIGH, EXACT\n\
                  LT lo(LEVEL, 10) -> LOW\n\
                  GT hi(LEVEL, 10) -> HIGH\n\
                  EQ eq(LEVEL, 10) -> EXACT\n";
    let mut e = engine(source);

    e.set_analog("LEVEL", 5);
    scan(&mut e);
    assert!(e.signal_value("LOW"));
    assert!(!e.signal_value("HIGH"));
    assert!(!e.signal_value("EXACT"));

    e.set_analog("LEVEL", 10);
    scan(&mut e);
    assert!(!e.signal_value("LOW"));
    assert!(!e.signal_value("HIGH"));
    assert!(e.signal_value("EXACT"));

    e.set_analog("LEVEL", 200);
    scan(&mut e);
    assert!(e.signal_value("HIGH"));
}

#[test]
fn inline_negation_evaluates_in_the_same_scan() {
    let mut e = engine("IN A, B\nOUT Y\nAND g(A, NOT(B)) -> Y\n");
    e.set_signal("A", true);
    scan(&mut e);
    assert!(e.signal_value("Y"));

    e.set_signal("B", true);
    scan(&mut e);
    assert!(!e.signal_value("Y"));
}

#[test]
fn commit_barrier_defers_staged_writes() {
    let mut e = engine("IN A\nOUT Y\nOR g(A) -> Y\n");
    scan(&mut e);
    assert!(!e.signal_value("Y"));

    // staged after the scan: invisible to the committed snapshot,
    // immediately visible to read-back
    e.set_signal("A", true);
    let a = e.program().signal("A").unwrap();
    assert_eq!(e.signals()[a.index()], 0);
    assert!(e.signal_value("A"));

    scan(&mut e);
    assert!(e.signal_value("Y"));
}

#[test]
fn forward_reference_lags_one_scan_under_source_order() {
    let source = "IN A\nOUT Y\nNOT n1(T) -> Y\nNOT n2(A) -> T\n";
    let mut e = engine(source);
    assert!(e.order().has_forward_refs());

    // scan 1 still sees last scan's T=0
    scan(&mut e);
    assert!(e.signal_value("Y"));
    scan(&mut e);
    assert!(!e.signal_value("Y"));

    // the Kahn policy reorders the chain and settles immediately
    let prog = parse_source(source).unwrap();
    let mut e = Engine::with_policy(prog, OrderPolicy::Kahn);
    scan(&mut e);
    assert!(!e.signal_value("Y"));
}

#[test]
fn motor_demo_seals_in_and_cools_down() {
    let mut e = engine(include_str!("../../../demos/motor.rung"));

    scan(&mut e);
    assert!(!e.signal_value("M"));

    // START pulls the motor in; the seal keeps it in after release
    e.set_signal("START", true);
    scan(&mut e);
    assert!(e.signal_value("M"));
    assert!(e.signal_value("FAN"));

    e.set_signal("START", false);
    scan(&mut e);
    assert!(e.signal_value("M"));

    // STOP drops the motor; the fan runs on for the 5s off-delay
    e.set_signal("STOP", true);
    scan(&mut e);
    assert!(!e.signal_value("M"));
    for _ in 0..4 {
        scan(&mut e);
        assert!(e.signal_value("FAN"));
    }
    scan(&mut e);
    assert!(!e.signal_value("FAN"));

    // overtemperature flag reads the analog input against the constant
    e.set_analog("TEMP", 220);
    scan(&mut e);
    assert!(e.signal_value("TOO_HOT"));
}

#[test]
fn scans_are_deterministic() {
    let source = "IN CLK, R\nOUT Q\nCTU c(2, CLK, R) -> Q\nTON t(\"2s\", Q) -> SLOW\n";
    let drive = |e: &mut Engine| {
        let mut trace = Vec::new();
        for i in 0..12 {
            e.set_signal("CLK", i % 2 == 1);
            e.set_signal("R", i == 7);
            e.update(0.5, 2.0, true, false);
            trace.push(e.signals().to_vec());
        }
        trace
    };

    let mut a = engine(source);
    let mut b = engine(source);
    assert_eq!(drive(&mut a), drive(&mut b));
}
