//! Desk calculator HSM, grounded in `original_source/examples/qcalc/qcalc.py`'s
//! `QCalc`. The GTK front end doesn't port; the state graph and display-buffer
//! logic do, driven here by whatever calls `dispatch`.
use std::sync::Arc;

use qp_core::event::Event;
use qp_core::hsm::{Hsm, HsmBuilder};
use qp_core::signal::{Signal, ENTRY_SIG, EXIT_SIG, INIT_SIG, USER_SIG};
use qp_core::state::{Outcome, StateId};

pub const C_SIG: Signal = USER_SIG;
pub const CE_SIG: Signal = USER_SIG + 1;
pub const DIGIT_0_SIG: Signal = USER_SIG + 2;
pub const DIGIT_1_9_SIG: Signal = USER_SIG + 3;
pub const POINT_SIG: Signal = USER_SIG + 4;
pub const OPER_SIG: Signal = USER_SIG + 5;
pub const EQUALS_SIG: Signal = USER_SIG + 6;

const KEY_PLUS: char = '+';
const KEY_MINUS: char = '-';
const KEY_MULT: char = '*';
const KEY_DIVIDE: char = '/';

const ON: StateId = StateId::new(1);
const READY: StateId = StateId::new(2);
const RESULT: StateId = StateId::new(3);
const BEGIN: StateId = StateId::new(4);
const NEGATED1: StateId = StateId::new(5);
const OPERAND1: StateId = StateId::new(6);
const ZERO1: StateId = StateId::new(7);
const INT1: StateId = StateId::new(8);
const FRAC1: StateId = StateId::new(9);
const ERROR: StateId = StateId::new(10);
const OP_ENTERED: StateId = StateId::new(11);
const NEGATED2: StateId = StateId::new(12);
const OPERAND2: StateId = StateId::new(13);
const ZERO2: StateId = StateId::new(14);
const INT2: StateId = StateId::new(15);
const FRAC2: StateId = StateId::new(16);

pub struct Calculator {
    pub display: String,
    disp_width: usize,
    len: usize,
    operand1: f64,
    operand2: f64,
    op_key: char,
}

impl Calculator {
    pub fn new(disp_width: usize) -> Self {
        Self {
            display: " ".repeat(disp_width),
            disp_width,
            len: 0,
            operand1: 0.0,
            operand2: 0.0,
            op_key: '?',
        }
    }

    pub fn clear(&mut self) {
        self.display = format!("{}0", " ".repeat(self.disp_width - 1));
        self.len = 0;
    }

    pub fn insert(&mut self, key: char) {
        if self.len == 0 {
            self.display.truncate(self.disp_width - 1);
            self.display.push(key);
            self.len += 1;
        } else if self.len < self.disp_width - 1 {
            self.display.remove(0);
            self.display.push(key);
            self.len += 1;
        } else {
            log::warn!("display overflow, digit dropped");
        }
    }

    fn negate(&mut self) {
        self.clear();
        let tail = self.display.pop().unwrap();
        self.display.pop();
        self.display.push('-');
        self.display.push(tail);
    }

    /// Evaluates `operand1 op_key operand2` into `display`. Returns `false`
    /// (and leaves an "Error" message on display) on divide-by-zero or
    /// overflow, matching `QCalc.eval`.
    fn eval(&mut self) -> bool {
        let result = match self.op_key {
            KEY_PLUS => self.operand1 + self.operand2,
            KEY_MINUS => self.operand1 - self.operand2,
            KEY_MULT => self.operand1 * self.operand2,
            KEY_DIVIDE => {
                if self.operand2.abs() > 1e-10 {
                    self.operand1 / self.operand2
                } else {
                    self.display = "Error 0".to_string();
                    return false;
                }
            }
            _ => unreachable!("op_key always set before eval"),
        };
        if result.abs() < 1.0e10 {
            let fixed = format!("{result:.11}");
            let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
            self.display = format!("{:>width$}", trimmed, width = self.disp_width);
            true
        } else {
            self.display = "Error 1".to_string();
            false
        }
    }

    fn display_value(&self) -> f64 {
        self.display.trim().parse().unwrap_or(0.0)
    }

    pub fn get_display(&self) -> &str {
        &self.display
    }
}

fn key_of(e: &Event) -> Option<char> {
    e.payload_ref::<char>().copied()
}

fn evt(sig: Signal, key: char) -> Event {
    Event::with_payload(sig, Arc::new(key))
}

pub fn build() -> Hsm<Calculator> {
    HsmBuilder::new("qcalc")
        .state(ON, None, |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG => Outcome::Handled,
            INIT_SIG => Outcome::Init(READY),
            s if s == C_SIG => {
                ctx.clear();
                Outcome::Tran(ON)
            }
            _ => Outcome::Super(qp_core::state::TOP),
        })
        .state(READY, Some(ON), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG => Outcome::Handled,
            INIT_SIG => Outcome::Init(BEGIN),
            s if s == DIGIT_0_SIG => {
                ctx.clear();
                Outcome::Tran(ZERO1)
            }
            s if s == DIGIT_1_9_SIG => {
                ctx.clear();
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(INT1)
            }
            s if s == POINT_SIG => {
                ctx.clear();
                ctx.insert('0');
                ctx.insert('.');
                Outcome::Tran(FRAC1)
            }
            s if s == OPER_SIG => {
                ctx.operand1 = ctx.display_value();
                ctx.op_key = key_of(e).unwrap_or('?');
                Outcome::Tran(OP_ENTERED)
            }
            _ => Outcome::Super(ON),
        })
        .state(RESULT, Some(READY), |_ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            _ => Outcome::Super(READY),
        })
        .state(BEGIN, Some(READY), |_ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == OPER_SIG && key_of(e) == Some(KEY_MINUS) => Outcome::Tran(NEGATED1),
            _ => Outcome::Super(READY),
        })
        .state(NEGATED1, Some(ON), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG => {
                ctx.negate();
                Outcome::Handled
            }
            EXIT_SIG => Outcome::Handled,
            s if s == OPER_SIG && key_of(e) == Some(KEY_MINUS) => Outcome::Handled,
            s if s == CE_SIG => {
                ctx.clear();
                Outcome::Tran(BEGIN)
            }
            s if s == DIGIT_0_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(ZERO1)
            }
            s if s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(INT1)
            }
            s if s == POINT_SIG => {
                ctx.insert('.');
                Outcome::Tran(FRAC1)
            }
            _ => Outcome::Super(ON),
        })
        .state(OPERAND1, Some(ON), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == CE_SIG => {
                ctx.clear();
                Outcome::Tran(BEGIN)
            }
            s if s == OPER_SIG => {
                ctx.operand1 = ctx.display_value();
                ctx.op_key = key_of(e).unwrap_or('?');
                Outcome::Tran(OP_ENTERED)
            }
            _ => Outcome::Super(ON),
        })
        .state(ZERO1, Some(OPERAND1), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == DIGIT_0_SIG => {
                log::warn!("ignored");
                Outcome::Handled
            }
            s if s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(INT1)
            }
            s if s == POINT_SIG => {
                ctx.insert('.');
                Outcome::Tran(FRAC1)
            }
            _ => Outcome::Super(OPERAND1),
        })
        .state(INT1, Some(OPERAND1), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == DIGIT_0_SIG || s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Handled
            }
            s if s == POINT_SIG => {
                ctx.insert('.');
                Outcome::Tran(FRAC1)
            }
            _ => Outcome::Super(OPERAND1),
        })
        .state(FRAC1, Some(OPERAND1), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == DIGIT_0_SIG || s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Handled
            }
            s if s == POINT_SIG => {
                log::warn!("ignored");
                Outcome::Handled
            }
            _ => Outcome::Super(OPERAND1),
        })
        .state(ERROR, Some(ON), |_ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            _ => Outcome::Super(ON),
        })
        .state(OP_ENTERED, Some(ON), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == OPER_SIG && key_of(e) == Some(KEY_MINUS) => {
                ctx.clear();
                Outcome::Tran(NEGATED2)
            }
            s if s == DIGIT_0_SIG => {
                ctx.clear();
                Outcome::Tran(ZERO2)
            }
            s if s == DIGIT_1_9_SIG => {
                ctx.clear();
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(INT2)
            }
            s if s == POINT_SIG => {
                ctx.clear();
                ctx.insert('0');
                ctx.insert('.');
                Outcome::Tran(FRAC2)
            }
            _ => Outcome::Super(ON),
        })
        .state(NEGATED2, Some(ON), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG => {
                ctx.negate();
                Outcome::Handled
            }
            EXIT_SIG => Outcome::Handled,
            s if s == OPER_SIG && key_of(e) == Some(KEY_MINUS) => Outcome::Handled,
            s if s == CE_SIG => Outcome::Tran(OP_ENTERED),
            s if s == DIGIT_0_SIG => Outcome::Tran(ZERO2),
            s if s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(INT2)
            }
            s if s == POINT_SIG => {
                ctx.insert('.');
                Outcome::Tran(FRAC2)
            }
            _ => Outcome::Super(ON),
        })
        .state(OPERAND2, Some(ON), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == CE_SIG => {
                ctx.clear();
                Outcome::Tran(OP_ENTERED)
            }
            s if s == OPER_SIG => {
                ctx.operand2 = ctx.display_value();
                if ctx.eval() {
                    ctx.operand1 = ctx.display_value();
                    ctx.op_key = key_of(e).unwrap_or('?');
                    Outcome::Tran(OP_ENTERED)
                } else {
                    Outcome::Tran(ERROR)
                }
            }
            s if s == EQUALS_SIG => {
                ctx.operand2 = ctx.display_value();
                if ctx.eval() {
                    Outcome::Tran(RESULT)
                } else {
                    Outcome::Tran(ERROR)
                }
            }
            _ => Outcome::Super(ON),
        })
        .state(ZERO2, Some(OPERAND2), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == DIGIT_0_SIG => {
                log::warn!("ignored");
                Outcome::Handled
            }
            s if s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Tran(INT2)
            }
            s if s == POINT_SIG => {
                ctx.insert('.');
                Outcome::Tran(FRAC2)
            }
            _ => Outcome::Super(OPERAND2),
        })
        .state(INT2, Some(OPERAND2), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == DIGIT_0_SIG || s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Handled
            }
            s if s == POINT_SIG => {
                ctx.insert('.');
                Outcome::Tran(FRAC2)
            }
            _ => Outcome::Super(OPERAND2),
        })
        .state(FRAC2, Some(OPERAND2), |ctx: &mut Calculator, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == DIGIT_0_SIG || s == DIGIT_1_9_SIG => {
                ctx.insert(key_of(e).unwrap_or('0'));
                Outcome::Handled
            }
            s if s == POINT_SIG => {
                log::warn!("ignored");
                Outcome::Handled
            }
            _ => Outcome::Super(OPERAND2),
        })
        .initial(|ctx: &mut Calculator| {
            ctx.clear();
            ON
        })
        .build()
        .unwrap()
}

/// Convenience wrapper pairing the HSM with its context for callers that
/// just want to post digit/operator key events and read the display back.
pub struct CalcEngine {
    hsm: Hsm<Calculator>,
    ctx: Calculator,
}

impl CalcEngine {
    pub fn new(disp_width: usize) -> Self {
        let mut ctx = Calculator::new(disp_width);
        let mut hsm = build();
        hsm.init(&mut ctx).expect("calculator init never fails");
        Self { hsm, ctx }
    }

    pub fn press_digit(&mut self, digit: char) {
        let sig = if digit == '0' { DIGIT_0_SIG } else { DIGIT_1_9_SIG };
        self.hsm.dispatch(&mut self.ctx, &evt(sig, digit)).unwrap();
    }

    pub fn press_point(&mut self) {
        self.hsm.dispatch(&mut self.ctx, &evt(POINT_SIG, '.')).unwrap();
    }

    pub fn press_op(&mut self, op: char) {
        self.hsm.dispatch(&mut self.ctx, &evt(OPER_SIG, op)).unwrap();
    }

    pub fn press_equals(&mut self) {
        self.hsm.dispatch(&mut self.ctx, &Event::new(EQUALS_SIG)).unwrap();
    }

    pub fn press_clear(&mut self) {
        self.hsm.dispatch(&mut self.ctx, &Event::new(C_SIG)).unwrap();
    }

    pub fn display(&self) -> &str {
        self.ctx.get_display()
    }

    pub fn is_in(&self, s: StateId) -> bool {
        self.hsm.is_in(s)
    }
}
