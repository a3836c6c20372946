use criterion::{ criterion_group, criterion_main, Criterion };

use vgg19::Tensor;


fn convolution(c: &mut Criterion) {
  let input = Tensor::<f32>::randn(&[1, 28, 28, 64]).tracked();
  let kernels = Tensor::randn(&[3, 3, 64, 64]).tracked();
  c.bench_function("convolve2d 28x28x64", |b| {
    b.iter(|| input.convolve2d(&kernels, true) )
  });
}

fn pooling(c: &mut Criterion) {
  let input = Tensor::<f32>::randn(&[1, 112, 112, 64]).tracked();
  c.bench_function("max_pool2d 112x112x64", |b| {
    b.iter(|| input.max_pool2d(2) )
  });
}

fn dense(c: &mut Criterion) {
  let input = Tensor::<f32>::randn(&[8, 4096]).tracked();
  let weights = Tensor::randn(&[4096, 4096]).tracked();
  c.bench_function("mm 8x4096x4096", |b| {
    b.iter(|| input.mm(&weights) )
  });
}

criterion_group! {
  name = benches;
  config = Criterion::default().sample_size(10);
  targets = convolution, pooling, dense
}
criterion_main!(benches);
