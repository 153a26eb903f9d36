use rand::Rng;

// --- 洗牌算法 ---

/// 标准 Fisher–Yates 洗牌（真随机版本）
///
/// 从尾部向前迭代：索引 `i` 从 len-1 递减到 1，
/// 每次在 `[0, i]` 中均匀取 `j` 并交换，产生均匀随机排列。
/// 用于首次初始化与牌堆引擎的耗尽重洗，不要求可复现。
pub fn fisher_yates<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// 确定性伪随机数生成器：取 `sin(seed) * 10000` 的小数部分，每次调用后种子自增。
///
/// 给定相同的初始种子，两个独立的对等端会产生完全相同的序列——
/// 这是"洗牌结果只需广播一个种子也能收敛"的基础
/// （实现中为了稳妥仍会广播完整状态）。
fn seeded_random(seed: &mut f64) -> f64 {
    let x = seed.sin() * 10000.0;
    *seed += 1.0;
    x - x.floor()
}

/// 带种子的 Fisher–Yates 洗牌（确定性版本）
///
/// 相同的 `(items, seed)` 在任何对等端上都得到完全相同的输出顺序。
pub fn shuffle_with_seed<T>(items: &mut [T], seed: u64) {
    let mut s = seed as f64;
    for i in (1..items.len()).rev() {
        let j = (seeded_random(&mut s) * (i as f64 + 1.0)).floor() as usize;
        items.swap(i, j);
    }
}

/// 生成一个新的洗牌种子
///
/// 限制在 u32 范围内，保证转成 f64 时无精度损失。
pub fn random_seed() -> u64 {
    rand::rng().random::<u32>() as u64
}

// --- 单元测试 ---
