//! The nine two-input logic tasks.
//!
//! An output earns a task when it equals the task's function applied to one
//! (NOT) or two of the organism's recent inputs. Each task is rewarded once
//! per gestation by doubling the bonus `value` times.

use replicon_core::{Environment, TaskOutcome};

/// Which bits of the world inputs are random; the top byte is a tag.
pub const INPUT_MASK: i32 = 0x00ff_ffff;
/// Top-byte tags of the three input values.
pub const INPUT_TAGS: [i32; 3] = [0x0f << 24, 0x33 << 24, 0x55 << 24];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Logic {
    Not,
    Nand,
    And,
    OrN,
    Or,
    AndN,
    Nor,
    Xor,
    Equ,
}

impl Logic {
    const ALL: [Logic; 9] = [
        Logic::Not,
        Logic::Nand,
        Logic::And,
        Logic::OrN,
        Logic::Or,
        Logic::AndN,
        Logic::Nor,
        Logic::Xor,
        Logic::Equ,
    ];

    const fn name(self) -> &'static str {
        match self {
            Logic::Not => "NOT",
            Logic::Nand => "NAND",
            Logic::And => "AND",
            Logic::OrN => "ORN",
            Logic::Or => "OR",
            Logic::AndN => "ANDN",
            Logic::Nor => "NOR",
            Logic::Xor => "XOR",
            Logic::Equ => "EQU",
        }
    }

    /// Bonus doublings awarded.
    const fn value(self) -> i32 {
        match self {
            Logic::Not | Logic::Nand => 1,
            Logic::And | Logic::OrN => 2,
            Logic::Or | Logic::AndN => 3,
            Logic::Nor | Logic::Xor => 4,
            Logic::Equ => 5,
        }
    }

    fn matches(self, inputs: &[i32], output: i32) -> bool {
        if self == Logic::Not {
            return inputs.iter().any(|&a| output == !a);
        }
        inputs.iter().enumerate().any(|(i, &a)| {
            inputs
                .iter()
                .enumerate()
                .any(|(j, &b)| i != j && output == self.apply(a, b))
        })
    }

    const fn apply(self, a: i32, b: i32) -> i32 {
        match self {
            Logic::Not => !a,
            Logic::Nand => !(a & b),
            Logic::And => a & b,
            Logic::OrN => a | !b,
            Logic::Or => a | b,
            Logic::AndN => a & !b,
            Logic::Nor => !(a | b),
            Logic::Xor => a ^ b,
            Logic::Equ => !(a ^ b),
        }
    }
}

/// Environment with one reaction per logic task.
#[derive(Debug, Clone, Default)]
pub struct LogicEnvironment;

impl LogicEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Index of the task called `name` (case-insensitive).
    #[must_use]
    pub fn task_index(&self, name: &str) -> Option<usize> {
        Logic::ALL
            .iter()
            .position(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl Environment for LogicEnvironment {
    fn num_tasks(&self) -> usize {
        Logic::ALL.len()
    }

    fn num_reactions(&self) -> usize {
        Logic::ALL.len()
    }

    fn task_name(&self, task: usize) -> &str {
        Logic::ALL.get(task).map_or("unknown", |t| t.name())
    }

    fn evaluate(&self, inputs: &[i32], output: i32, task_counts: &[u32]) -> TaskOutcome {
        let mut outcome = TaskOutcome::default();
        for (idx, task) in Logic::ALL.iter().enumerate() {
            if !task.matches(inputs, output) {
                continue;
            }
            outcome.tasks.push(idx);
            if task_counts.get(idx).copied().unwrap_or(0) == 0 {
                outcome.reactions.push(idx);
                outcome.bonus_mult *= f64::from(1 << task.value());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: i32 = 0x0f13_149f;
    const B: i32 = 0x3308_e53e;

    #[test]
    fn test_task_names() {
        let env = LogicEnvironment::new();
        assert_eq!(env.num_tasks(), 9);
        assert_eq!(env.task_name(0), "NOT");
        assert_eq!(env.task_name(8), "EQU");
        assert_eq!(env.task_index("xor"), Some(7));
    }

    #[test]
    fn test_not_rewarded_once() {
        let env = LogicEnvironment::new();
        let first = env.evaluate(&[A, B], !A, &[0; 9]);
        assert_eq!(first.tasks, vec![0]);
        assert_eq!(first.bonus_mult, 2.0);

        let mut counts = [0u32; 9];
        counts[0] = 1;
        let again = env.evaluate(&[A, B], !A, &counts);
        assert_eq!(again.tasks, vec![0]);
        assert!(again.reactions.is_empty());
        assert_eq!(again.bonus_mult, 1.0);
    }

    #[test]
    fn test_two_input_tasks() {
        let env = LogicEnvironment::new();
        let equ = env.evaluate(&[A, B], !(A ^ B), &[0; 9]);
        assert!(equ.tasks.contains(&8));
        assert_eq!(equ.bonus_mult, 32.0);
        let andn = env.evaluate(&[A, B], B & !A, &[0; 9]);
        assert!(andn.tasks.contains(&5));
    }

    #[test]
    fn test_single_input_cannot_do_pairs() {
        let env = LogicEnvironment::new();
        let outcome = env.evaluate(&[A], A & A, &[0; 9]);
        assert!(!outcome.tasks.contains(&2));
    }

    #[test]
    fn test_echo_earns_nothing() {
        let env = LogicEnvironment::new();
        assert!(env.evaluate(&[A, B], A, &[0; 9]).tasks.is_empty());
    }
}
