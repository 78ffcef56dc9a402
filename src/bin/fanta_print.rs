//! Tiny CLI demo for `fantac-typegraph`: decodes a type from a pre-baked,
//! in-memory DIE fixture and prints both its `Display` header and a mock
//! value read through a [`MockOracle`]. There is no real object-file or
//! ptrace plumbing here — that is out of scope for the library (see
//! `spec.md` §1) and this binary exists only to exercise the decoder and
//! printer together end to end.

use clap::{Parser, ValueEnum};
use tracing::info;

use fantac_typegraph::decoder::{self, Cache};
use fantac_typegraph::die::{AttrName, AttrValue, DwTag, Offset, RawDie, StreamBuilder};
use fantac_typegraph::oracle::MockOracle;
use fantac_typegraph::printer::Printer;

/// Address size (bytes) assumed for every fixture in this demo.
const ADDRESS_SIZE: u8 = 8;

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode and print a type from a built-in DWARF fixture")]
struct Args {
    /// Which built-in fixture to decode and print.
    #[arg(value_enum, default_value = "linked-list")]
    fixture: Fixture,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Fixture {
    LinkedList,
    SliceOfStrings,
    MapIntInt,
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!("fanta_print={level},fantac_typegraph={level}")))
        .init();

    match args.fixture {
        Fixture::LinkedList => run_linked_list(),
        Fixture::SliceOfStrings => run_slice_of_strings(),
        Fixture::MapIntInt => run_map_int_int(),
    }
}

fn int32_die(offset: Offset, name: &str) -> RawDie {
    RawDie::new(
        offset,
        DwTag::BaseType,
        false,
        vec![
            (AttrName::Name, AttrValue::Str(name.to_string())),
            (AttrName::ByteSize, AttrValue::UConstant(4)),
            (AttrName::Encoding, AttrValue::UConstant(0x05)),
        ],
    )
}

fn run_linked_list() {
    info!("building linked-list fixture");
    // struct Node { next *Node; val int32 }
    //   offset 0: StructureType "Node", children: Member next@0, Member val@8
    //   offset 1: PointerType -> offset 0
    //   offset 2: Member next (type=1, location=0)
    //   offset 3: BaseType int32
    //   offset 4: Member val (type=3, location=8)
    let mut reader = StreamBuilder::new()
        .die(RawDie::new(
            0,
            DwTag::StructureType,
            true,
            vec![(AttrName::Name, AttrValue::Str("Node".to_string())), (AttrName::ByteSize, AttrValue::UConstant(16))],
        ))
        .die(RawDie::new(
            2,
            DwTag::Member,
            false,
            vec![
                (AttrName::Name, AttrValue::Str("next".to_string())),
                (AttrName::Type, AttrValue::Ref(1)),
                (AttrName::DataMemberLocation, AttrValue::UConstant(0)),
            ],
        ))
        .die(RawDie::new(
            4,
            DwTag::Member,
            false,
            vec![
                (AttrName::Name, AttrValue::Str("val".to_string())),
                (AttrName::Type, AttrValue::Ref(3)),
                (AttrName::DataMemberLocation, AttrValue::UConstant(8)),
            ],
        ))
        .end_children()
        .die(RawDie::new(1, DwTag::PointerType, false, vec![(AttrName::Type, AttrValue::Ref(0))]))
        .die(int32_die(3, "int32"))
        .build();

    let mut cache = Cache::new();
    let node_ty = decoder::decode_type(&mut reader, 0, ADDRESS_SIZE, &mut cache).expect("decode Node");
    println!("type: {}", node_ty.borrow());

    // A 2-node cyclic list: head -> tail -> head.
    let mut oracle = MockOracle::new();
    const HEAD: u64 = 0x1000;
    const TAIL: u64 = 0x1010;
    oracle.write_u64(HEAD, TAIL);
    oracle.write_i64(HEAD + 8, 1);
    oracle.write_u64(TAIL, HEAD);
    oracle.write_i64(TAIL + 8, 2);

    let mut printer = Printer::new();
    let (text, err) = printer.print(&node_ty, HEAD, &oracle);
    println!("value: {text}");
    if let Some(e) = err {
        eprintln!("error during print: {e}");
    }
}

fn run_slice_of_strings() {
    info!("building []string fixture");
    // offset 0: StructureType (go_kind=slice) { array *string@0, len int@8, cap int@16 }, element -> offset 5
    // offset 5: StructureType (go_kind=string) { }
    let mut reader = StreamBuilder::new()
        .die(RawDie::new(
            0,
            DwTag::StructureType,
            true,
            vec![(AttrName::GoKind, AttrValue::SConstant(23)), (AttrName::Type, AttrValue::Ref(5))],
        ))
        .die(RawDie::new(
            1,
            DwTag::Member,
            false,
            vec![(AttrName::Name, AttrValue::Str("array".to_string())), (AttrName::DataMemberLocation, AttrValue::UConstant(0))],
        ))
        .die(RawDie::new(
            2,
            DwTag::Member,
            false,
            vec![
                (AttrName::Name, AttrValue::Str("len".to_string())),
                (AttrName::Type, AttrValue::Ref(3)),
                (AttrName::DataMemberLocation, AttrValue::UConstant(8)),
            ],
        ))
        .die(RawDie::new(
            4,
            DwTag::Member,
            false,
            vec![
                (AttrName::Name, AttrValue::Str("cap".to_string())),
                (AttrName::Type, AttrValue::Ref(3)),
                (AttrName::DataMemberLocation, AttrValue::UConstant(16)),
            ],
        ))
        .end_children()
        .die(int32_die(3, "int"))
        .die(RawDie::new(5, DwTag::StructureType, false, vec![(AttrName::GoKind, AttrValue::SConstant(24))]))
        .build();

    let mut cache = Cache::new();
    let slice_ty = decoder::decode_type(&mut reader, 0, ADDRESS_SIZE, &mut cache).expect("decode []string");
    println!("type: {}", slice_ty.borrow());

    let mut oracle = MockOracle::new();
    const HEADER: u64 = 0x200;
    oracle.write_u64(HEADER, 0x300);
    oracle.write_u64(HEADER + 8, 3);
    oracle.write_u64(HEADER + 16, 3);
    oracle.write_string_header(0x300, 0x1000, "a");
    oracle.write_string_header(0x310, 0x1010, "bb");
    oracle.write_string_header(0x320, 0x1020, "ccc");

    let mut printer = Printer::new();
    let (text, err) = printer.print(&slice_ty, HEADER, &oracle);
    println!("value: {text}");
    if let Some(e) = err {
        eprintln!("error during print: {e}");
    }
}

fn run_map_int_int() {
    info!("building map[int32]int32 fixture");
    let mut reader = StreamBuilder::new()
        .die(RawDie::new(
            0,
            DwTag::Typedef,
            false,
            vec![
                (AttrName::Name, AttrValue::Str("map[int32]int32".to_string())),
                (AttrName::GoKind, AttrValue::SConstant(21)),
                (AttrName::Type, AttrValue::Ref(1)),
                (AttrName::GoKey, AttrValue::Ref(1)),
                (AttrName::GoElem, AttrValue::Ref(1)),
            ],
        ))
        .die(int32_die(1, "int32"))
        .build();

    let mut cache = Cache::new();
    let map_ty = decoder::decode_type(&mut reader, 0, ADDRESS_SIZE, &mut cache).expect("decode map");
    println!("type: {}", map_ty.borrow());

    let mut oracle = MockOracle::new();
    let mut entries = Vec::new();
    for i in 0..10u64 {
        let key_addr = 0x1000 + i * 16;
        let val_addr = key_addr + 8;
        oracle.write_i64(key_addr, i as i64);
        oracle.write_i64(val_addr, (i * 10) as i64);
        entries.push((key_addr, val_addr));
    }
    oracle.register_map(0x500, entries);

    let mut printer = Printer::new();
    let (text, err) = printer.print(&map_ty, 0x500, &oracle);
    println!("value: {text}");
    if let Some(e) = err {
        eprintln!("error during print: {e}");
    }
}
