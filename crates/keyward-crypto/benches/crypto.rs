use keyward_core::{Curve, Namespace, HARDENED};
use keyward_crypto::slip39::{shamir, split_master_secret};
use keyward_crypto::{bip39_seed, combine_shares, Keychain, SecretBytes, Share};
use rand::rngs::StdRng;
use rand::SeedableRng;

const MNEMONIC: &[u8] =
    b"abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn keychain() -> Keychain {
    let seed = bip39_seed(MNEMONIC, "").unwrap();
    Keychain::new(
        seed,
        vec![
            Namespace::new(Curve::Secp256k1, [44 | HARDENED]),
            Namespace::new(Curve::Ed25519, [44 | HARDENED]),
        ],
    )
}

#[divan::bench(args = [1, 3, 5])]
fn bench_keychain_derive_secp256k1(bencher: divan::Bencher, extra: usize) {
    let mut kc = keychain();
    let mut path = vec![44 | HARDENED];
    path.extend((0..extra as u32).map(|i| i | HARDENED));
    bencher.bench_local(|| kc.derive(divan::black_box(&path), Curve::Secp256k1).unwrap());
}

#[divan::bench(args = [1, 3, 5])]
fn bench_keychain_derive_ed25519(bencher: divan::Bencher, extra: usize) {
    let mut kc = keychain();
    let mut path = vec![44 | HARDENED];
    path.extend((0..extra as u32).map(|i| i | HARDENED));
    bencher.bench_local(|| kc.derive(divan::black_box(&path), Curve::Ed25519).unwrap());
}

#[divan::bench(args = [2, 5, 16])]
fn bench_combine_shares(bencher: divan::Bencher, threshold: u8) {
    let mut rng = StdRng::seed_from_u64(1);
    let set = split_master_secret(&mut rng, &[7u8; 32], threshold, threshold, 0, b"").unwrap();
    let shares: Vec<Share> = set.mnemonics.iter().map(|m| Share::parse(m).unwrap()).collect();
    let points: Vec<(u8, &[u8])> = shares.iter().map(|s| (s.index, s.value.as_bytes())).collect();
    bencher.bench(|| combine_shares(threshold, divan::black_box(&points)).unwrap());
}

#[divan::bench]
fn bench_shamir_split(bencher: divan::Bencher) {
    let mut rng = StdRng::seed_from_u64(2);
    let secret = SecretBytes::from_slice(&[3u8; 32]);
    bencher.bench_local(|| {
        shamir::split_secret(&mut rng, 3, 5, divan::black_box(secret.as_bytes())).unwrap()
    });
}

fn main() {
    divan::main();
}
