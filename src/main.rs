/// exprfold-dump - optimizer demo CLI
use exprfold::bytecode::chunk::{Bytecode, BytecodeBuilder};
use exprfold::data::Snapshot;
use exprfold::op::Op;
use exprfold::optimize::{optimize, OptimizeConfig};
use std::env;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("exprfold-dump {}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    exprfold-dump [OPTIONS] <DEMO>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help      Print this help message");
    eprintln!("    -v, --version   Print version information");
    eprintln!("    -l, --list      List available demo programs");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <DEMO>          Name of a built-in demo program to optimize");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    exprfold-dump powi");
    eprintln!("    exprfold-dump --list");
}

fn print_version() {
    println!("exprfold-dump {}", VERSION);
}

/// Each demo builds the bytecode a naive front end would emit for a small
/// expression, variable names included so the dump reads back naturally.
fn demos() -> Vec<(&'static str, Vec<String>, Bytecode)> {
    vec![
        ("powi", vec!["x".into()], {
            // x*x*x*x*x*x*x*x, the way repeated squaring would come out of a parser.
            let mut b = BytecodeBuilder::new();
            b.push_var(0);
            for _ in 0..7 {
                b.push_var(0).push_op(Op::Mul);
            }
            b.finish()
        }),
        ("pythagorean", vec!["x".into()], {
            // sin(x)^2 + cos(x)^2
            let mut b = BytecodeBuilder::new();
            b.push_var(0).push_op(Op::Sin).push_immed(2.0).push_op(Op::Pow);
            b.push_var(0).push_op(Op::Cos).push_immed(2.0).push_op(Op::Pow);
            b.push_op(Op::Add);
            b.finish()
        }),
        ("shared-subexpr", vec!["a".into(), "b".into(), "c".into(), "d".into()], {
            // (a+b)*c + (a+b)*d
            let mut b = BytecodeBuilder::new();
            b.push_var(0).push_var(1).push_op(Op::Add);
            b.push_var(2).push_op(Op::Mul);
            b.push_var(0).push_var(1).push_op(Op::Add);
            b.push_var(3).push_op(Op::Mul);
            b.push_op(Op::Add);
            b.finish()
        }),
        ("constant-fold", vec![], {
            // (2 + 3) * (4 - 1)
            let mut b = BytecodeBuilder::new();
            b.push_immed(2.0).push_immed(3.0).push_op(Op::Add);
            b.push_immed(4.0).push_immed(1.0).push_op(Op::Sub);
            b.push_op(Op::Mul);
            b.finish()
        }),
    ]
}

fn dump_bytecode(bc: &Bytecode) {
    println!("  {} bytes, {} immediates", bc.code.len(), bc.immed.len());
    let mut ip = 0usize;
    while ip < bc.code.len() {
        let op = match Op::from_byte(bc.code[ip]) {
            Some(op) => op,
            None => {
                println!("    {ip:>4}: <invalid byte 0x{:02x}>", bc.code[ip]);
                break;
            }
        };
        let operand_len = Bytecode::operand_len(op);
        print!("    {ip:>4}: {op}");
        match operand_len {
            2 => {
                let idx = u16::from_le_bytes([bc.code[ip + 1], bc.code[ip + 2]]);
                if op == Op::Immed {
                    print!(" {} ({})", idx, bc.immed.get(idx as usize).copied().unwrap_or(f64::NAN));
                } else {
                    print!(" {idx}");
                }
            }
            4 => {
                let target = u32::from_le_bytes([
                    bc.code[ip + 1],
                    bc.code[ip + 2],
                    bc.code[ip + 3],
                    bc.code[ip + 4],
                ]);
                print!(" -> {target}");
            }
            _ => {}
        }
        println!();
        ip += 1 + operand_len;
    }
}

fn run_demo(name: &str) -> Result<(), String> {
    let (_, var_names, bytecode) = demos()
        .into_iter()
        .find(|(n, _, _)| *n == name)
        .ok_or_else(|| format!("unknown demo: {name}"))?;

    println!("before:");
    dump_bytecode(&bytecode);

    let mut snapshot = Snapshot::new(bytecode, var_names, vec![]);
    let stats = optimize(&mut snapshot, &OptimizeConfig::default())
        .map_err(|e| format!("optimization failed: {e}"))?;

    println!("after:");
    dump_bytecode(&snapshot.bytecode);
    println!(
        "stats: {} -> {} bytes ({:+} bytes), {} peephole rewrite(s), {} DCE byte(s) removed",
        stats.original_bytes,
        stats.optimized_bytes,
        -stats.bytes_saved(),
        stats.peephole.total_optimizations(),
        stats.dce.bytes_removed,
    );
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "-h" | "--help" => print_usage(),
        "-v" | "--version" => print_version(),
        "-l" | "--list" => {
            for (name, _, _) in demos() {
                println!("{name}");
            }
        }
        name => {
            if let Err(e) = run_demo(name) {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
