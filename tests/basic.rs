use wcpu::{Cpu, ProgramImage};

const STEP_LIMIT: u64 = 10_000;

fn run(wat: &str) -> Cpu {
    let image = ProgramImage::from_wat(wat).unwrap();
    let mut cpu = Cpu::new(image).unwrap();
    cpu.run(STEP_LIMIT).unwrap();
    cpu
}

#[test]
fn const_add() {
    let cpu = run(r#"
        (module
            (func i32.const 2 i32.const 3 i32.add)
            (start 0))
    "#);
    assert_eq!(cpu.operand_stack(), &[5]);
}

#[test]
fn add_then_mul() {
    let cpu = run(r#"
        (module
            (func
                i32.const 2
                i32.const 3
                i32.add
                i32.const 4
                i32.mul)
            (start 0))
    "#);
    assert_eq!(cpu.operand_stack(), &[20]);
}

#[test]
fn drop_discards_one_operand() {
    let cpu = run(r#"
        (module
            (func i32.const 1 i32.const 2 drop)
            (start 0))
    "#);
    assert_eq!(cpu.operand_stack(), &[1]);
}

#[test]
fn empty_start_function_halts_untouched() {
    let cpu = run(r#"
        (module
            (func)
            (start 0))
    "#);
    assert!(cpu.is_halted());
    assert!(cpu.operand_stack().is_empty());
    assert_eq!(cpu.registers(), &[0; 4]);
}

#[test]
fn local_set_and_get_use_the_register_file() {
    let cpu = run(r#"
        (module
            (func (local i32 i32 i32)
                i32.const 9
                local.set 2
                local.get 2
                local.get 2
                i32.add)
            (start 0))
    "#);
    assert_eq!(cpu.operand_stack(), &[18]);
    assert_eq!(cpu.registers()[2], 9);
}

#[test]
fn call_binds_parameters_top_of_stack_first() {
    let cpu = run(r#"
        (module
            (func $main i32.const 1 i32.const 2 call $probe)
            (func $probe (param i32 i32) local.get 0 local.get 1)
            (start $main))
    "#);
    // Topmost operand (2) became register 0, the next (1) register 1.
    assert_eq!(cpu.operand_stack(), &[2, 1]);
}

#[test]
fn return_restores_the_caller_register_window() {
    let cpu = run(r#"
        (module
            (func $main (local i32)
                i32.const 7
                local.set 0
                i32.const 3
                call $inc
                local.get 0)
            (func $inc (param i32)
                local.get 0
                i32.const 1
                i32.add)
            (start $main))
    "#);
    // $inc saw 3 in register 0 and left 4 on the shared operand stack;
    // after the return $main's register 0 is 7 again.
    assert_eq!(cpu.operand_stack(), &[4, 7]);
    assert_eq!(cpu.registers()[0], 7);
}

#[test]
fn nested_calls_balance_the_stacks() {
    let cpu = run(r#"
        (module
            (func $main (local i32)
                i32.const 5
                call $outer
                local.get 0)
            (func $outer (param i32)
                local.get 0
                call $inner
                local.get 0
                i32.add)
            (func $inner (param i32)
                local.get 0
                i32.const 2
                i32.mul)
            (start $main))
    "#);
    // inner: 5 * 2 = 10; outer adds its own 5 back: 15; main's register 0
    // was never bound and reads 0.
    assert_eq!(cpu.operand_stack(), &[15, 0]);
    assert_eq!(cpu.registers(), &[0; 4]);
}

#[test]
fn arithmetic_wraps_modulo_two_pow_32() {
    let cpu = run(r#"
        (module
            (func
                i32.const 2147483647
                i32.const 1
                i32.add)
            (start 0))
    "#);
    assert_eq!(cpu.operand_stack(), &[i32::MIN]);
}
